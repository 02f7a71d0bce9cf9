// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::handler::IngestHandler;
use crate::http_utils::{log_and_create_http_response, Body, HttpResponse};

/// Serves an [`IngestHandler`] over HTTP/1 on the configured endpoint path.
pub struct IngestServer {
    pub config: Arc<Config>,
    pub handler: Arc<IngestHandler>,
}

impl IngestServer {
    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        debug!(
            "Event ingest server started: listening on {} at {}",
            listener.local_addr()?,
            self.config.endpoint_path
        );
        debug!(
            "Time taken to start the event ingest server: {} ms",
            now.elapsed().as_millis()
        );
        self.serve(listener, shutdown).await
    }

    /// Accepts connections on `listener` until `shutdown` is cancelled.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let handler = self.handler.clone();
        let endpoint_path: Arc<str> = Arc::from(self.config.endpoint_path.as_str());

        let service = service_fn(move |req: Request<Incoming>| {
            // called for each http request
            let handler = handler.clone();
            let endpoint_path = endpoint_path.clone();
            async move { Self::endpoint_handler(&endpoint_path, &handler, req).await }
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Event ingest server shutting down");
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }

    async fn endpoint_handler(
        endpoint_path: &str,
        handler: &IngestHandler,
        req: Request<Incoming>,
    ) -> http::Result<HttpResponse> {
        if req.uri().path() != endpoint_path {
            let mut not_found = Response::new(Body::default());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            return Ok(not_found);
        }
        if req.method() != Method::POST {
            return log_and_create_http_response(
                &format!("Method {} not allowed on {endpoint_path}", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            );
        }
        handler.handle(req).await
    }
}
