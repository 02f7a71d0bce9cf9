// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::{body::Body, http, Request, StatusCode};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, Dispatch, Instrument};

use crate::collector::{CollectorError, EventCollector};
use crate::config::Config;
use crate::context::RequestContext;
use crate::decoder::{self, ContentMode, DecodedEvents};
use crate::error::{BatchError, EventFailure, IngestError};
use crate::event::Event;
use crate::http_utils::{
    self, create_success_response, log_and_create_error_response, log_and_create_http_response,
    HttpResponse,
};
use crate::normalizer::{event_span, normalize};

/// Receives CloudEvents over HTTP and forwards each of them to an [`EventCollector`].
///
/// The handler keeps no per-request state and is meant to be shared behind an `Arc`.
pub struct IngestHandler {
    collector: Arc<dyn EventCollector + Send + Sync>,
    max_request_content_length: usize,
    max_batch_size: Option<usize>,
    max_concurrent_forwards: usize,
    dispatch: Option<Dispatch>,
}

impl IngestHandler {
    pub fn new(collector: Arc<dyn EventCollector + Send + Sync>, config: &Config) -> Self {
        IngestHandler {
            collector,
            max_request_content_length: config.max_request_content_length,
            max_batch_size: config.max_batch_size,
            max_concurrent_forwards: config
                .max_concurrent_forwards
                .min(Semaphore::MAX_PERMITS),
            dispatch: None,
        }
    }

    /// Logs of this handler, including those of batch forwarding tasks, go to `dispatch`
    /// instead of the process-wide default subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        match &self.dispatch {
            Some(dispatch) => {
                self.handle_request(req)
                    .with_subscriber(dispatch.clone())
                    .await
            }
            None => self.handle_request(req).await,
        }
    }

    async fn handle_request<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();

        let mode = match ContentMode::from_headers(&parts.headers) {
            Ok(mode) => mode,
            Err(err) => return log_and_create_error_response(&err),
        };

        if let Some(response) = http_utils::verify_request_content_length(
            &parts.headers,
            self.max_request_content_length,
            "Error processing events",
        ) {
            return response;
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return log_and_create_http_response(
                    &format!("Error reading request body: {err}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        // double check the body size in case transfer encoding is used
        if body.len() > self.max_request_content_length {
            return log_and_create_http_response(
                "Error processing events: Payload too large",
                StatusCode::PAYLOAD_TOO_LARGE,
            );
        }

        let (ctx, _cancel_on_drop) = RequestContext::with_drop_guard();
        match self.ingest(&ctx, mode, &body).await {
            Ok(count) => {
                debug!("Successfully forwarded {count} events");
                create_success_response()
            }
            Err(err) => log_and_create_error_response(&err),
        }
    }

    /// Decodes `body` according to `mode` and forwards every event. Returns the number
    /// of forwarded events.
    pub async fn ingest(
        &self,
        ctx: &RequestContext,
        mode: ContentMode,
        body: &[u8],
    ) -> Result<usize, IngestError> {
        let decoded = decoder::decode(mode, body)?;
        let count = decoded.len();
        if decoded.is_empty() {
            debug!("Received empty batch, nothing to forward");
            return Ok(0);
        }
        match decoded {
            DecodedEvents::Single(event) => self.process_single(ctx, event).await?,
            DecodedEvents::Batch(events) => self.process_batch(ctx, events).await?,
        }
        Ok(count)
    }

    pub async fn process_single(
        &self,
        ctx: &RequestContext,
        event: Event,
    ) -> Result<(), IngestError> {
        let event_id = event.id().to_string();
        forward_event(Arc::clone(&self.collector), ctx.clone(), event)
            .await
            .map_err(|source| IngestError::Forward { event_id, source })
    }

    /// Forwards every event of the batch on its own task and waits for all of them.
    /// A failing event never stops the others; every failure is reported.
    pub async fn process_batch(
        &self,
        ctx: &RequestContext,
        events: Vec<Event>,
    ) -> Result<(), IngestError> {
        let total = events.len();
        if let Some(max) = self.max_batch_size {
            if total > max {
                return Err(IngestError::BatchTooLarge { len: total, max });
            }
        }
        debug!("Received batch of {total} events");

        let limiter = (self.max_concurrent_forwards > 0)
            .then(|| Arc::new(Semaphore::new(self.max_concurrent_forwards)));

        let mut event_ids = Vec::with_capacity(total);
        let mut tasks = JoinSet::new();
        for (index, event) in events.into_iter().enumerate() {
            event_ids.push(event.id().to_string());
            let forward = forward_event(Arc::clone(&self.collector), ctx.clone(), event);
            let limiter = limiter.clone();
            let task = async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                (index, forward.await)
            };
            match &self.dispatch {
                Some(dispatch) => tasks.spawn(task.with_subscriber(dispatch.clone())),
                None => tasks.spawn(task),
            };
        }

        let mut reported = vec![false; total];
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, res)) => {
                    reported[index] = true;
                    if let Err(error) = res {
                        failures.push(EventFailure {
                            index,
                            event_id: event_ids[index].clone(),
                            error,
                        });
                    }
                }
                Err(err) => error!("Event forwarding task failed: {err}"),
            }
        }

        // a task that panicked never reported its index
        for (index, _) in reported.iter().enumerate().filter(|(_, done)| !**done) {
            failures.push(EventFailure {
                index,
                event_id: event_ids[index].clone(),
                error: CollectorError::Other(anyhow::anyhow!(
                    "forwarding task did not complete"
                )),
            });
        }

        match BatchError::from_failures(total, failures) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Normalizes and forwards one event. The returned future is instrumented with the
/// event's span, created in the caller's context so batch tasks stay attached to the
/// request that spawned them.
fn forward_event(
    collector: Arc<dyn EventCollector + Send + Sync>,
    ctx: RequestContext,
    mut event: Event,
) -> impl Future<Output = Result<(), CollectorError>> + Send + 'static {
    let span = event_span(&event);
    async move {
        normalize(&mut event);
        match collector.receive(&ctx, event).await {
            Ok(()) => {
                info!("event forwarded to downstream collector");
                Ok(())
            }
            Err(err) => {
                error!("unable to forward event to downstream collector: {err}");
                Err(err)
            }
        }
    }
    .instrument(span)
}
