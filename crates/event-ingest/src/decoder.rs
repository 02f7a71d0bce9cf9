// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::{header, http::HeaderMap};

use crate::error::IngestError;
use crate::event::Event;

pub const SINGLE_EVENT_CONTENT_TYPE: &str = "application/cloudevents+json";
pub const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Single,
    Batch,
}

impl ContentMode {
    /// Selects the decode mode from a `Content-Type` value. Media type parameters
    /// such as `charset` are ignored.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, IngestError> {
        let media_type = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .unwrap_or_default();

        if media_type.eq_ignore_ascii_case(SINGLE_EVENT_CONTENT_TYPE) {
            Ok(ContentMode::Single)
        } else if media_type.eq_ignore_ascii_case(BATCH_CONTENT_TYPE) {
            Ok(ContentMode::Batch)
        } else {
            Err(IngestError::UnsupportedMediaType(format!(
                "content type must be {SINGLE_EVENT_CONTENT_TYPE} or {BATCH_CONTENT_TYPE}"
            )))
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IngestError> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        ContentMode::from_content_type(content_type)
    }
}

/// Events decoded from one request body.
#[derive(Debug, PartialEq)]
pub enum DecodedEvents {
    Single(Event),
    Batch(Vec<Event>),
}

impl DecodedEvents {
    pub fn len(&self) -> usize {
        match self {
            DecodedEvents::Single(_) => 1,
            DecodedEvents::Batch(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn decode(mode: ContentMode, body: &[u8]) -> Result<DecodedEvents, IngestError> {
    match mode {
        ContentMode::Single => serde_json::from_slice(body)
            .map(DecodedEvents::Single)
            .map_err(IngestError::Decode),
        ContentMode::Batch => serde_json::from_slice(body)
            .map(DecodedEvents::Batch)
            .map_err(IngestError::Decode),
    }
}
