// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio_util::sync::{CancellationToken, DropGuard};

/// Per-request state handed to every forwarding call.
///
/// Cloning is cheap; every clone observes the same cancellation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext::default()
    }

    /// Creates a context together with a guard that cancels it when dropped.
    /// The handler keeps the guard alive for as long as the request future lives.
    pub fn with_drop_guard() -> (Self, DropGuard) {
        let ctx = RequestContext::new();
        let guard = ctx.cancellation.clone().drop_guard();
        (ctx, guard)
    }

    /// Completes once the request has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

#[cfg(test)]
impl RequestContext {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }
}
