// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use hyper::StatusCode;

use crate::collector::CollectorError;

/// Errors that end the handling of an ingest request.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("Error decoding events from request body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Error forwarding event {event_id} to the collector: {source}")]
    Forward {
        event_id: String,
        #[source]
        source: CollectorError,
    },

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Batch of {len} events exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            // decode failures are reported as internal errors, same as forwarding failures
            IngestError::Decode(_) | IngestError::Forward { .. } | IngestError::Batch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// A single event of a batch that the collector did not accept.
#[derive(Debug)]
pub struct EventFailure {
    /// Position of the event in the request body.
    pub index: usize,
    pub event_id: String,
    pub error: CollectorError,
}

/// Every forwarding failure of one batch, ordered by position in the batch.
#[derive(Debug)]
pub struct BatchError {
    total: usize,
    failures: Vec<EventFailure>,
}

impl BatchError {
    /// Returns `None` when nothing failed.
    pub fn from_failures(total: usize, mut failures: Vec<EventFailure>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        failures.sort_by_key(|failure| failure.index);
        Some(BatchError { total, failures })
    }

    pub fn failures(&self) -> &[EventFailure] {
        &self.failures
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} events failed to forward: ",
            self.failures.len(),
            self.total
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "[{}] {}", failure.event_id, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}
