// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Semaphore;

use crate::context::RequestContext;
use crate::event::Event;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector is closed")]
    Closed,

    #[error("request was cancelled before the event was accepted")]
    Cancelled,

    #[error("event rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Receives normalized events and hands them to some downstream broker.
///
/// Implementations are called concurrently for events of the same batch.
#[async_trait]
pub trait EventCollector {
    async fn receive(&self, ctx: &RequestContext, event: Event) -> Result<(), CollectorError>;
}

/// Forwards events into a bounded tokio mpsc channel. The receiving half is
/// owned by whatever ships events onwards.
#[derive(Clone, Debug)]
pub struct ChannelCollector {
    tx: Sender<Event>,
}

impl ChannelCollector {
    /// `buffer_size` is clamped to what a tokio channel supports.
    pub fn new(buffer_size: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size.clamp(1, Semaphore::MAX_PERMITS));
        (ChannelCollector { tx }, rx)
    }
}

#[async_trait]
impl EventCollector for ChannelCollector {
    async fn receive(&self, ctx: &RequestContext, event: Event) -> Result<(), CollectorError> {
        // a full channel applies backpressure until the request goes away
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(CollectorError::Cancelled),
            res = self.tx.send(event) => res.map_err(|_| CollectorError::Closed),
        }
    }
}
