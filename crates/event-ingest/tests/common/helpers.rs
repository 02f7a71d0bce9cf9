// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use event_ingest::collector::EventCollector;
use event_ingest::config::Config;
use event_ingest::handler::IngestHandler;
use event_ingest::server::IngestServer;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const ENDPOINT_PATH: &str = "/api/v1/events";

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: tokio::task::JoinHandle<()>,
}

/// Start an ingest server on a random port
pub async fn start_server(
    collector: Arc<dyn EventCollector + Send + Sync>,
    config: Config,
) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ingest server");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handler = Arc::new(IngestHandler::new(collector, &config));
    let server = IngestServer {
        config: Arc::new(config),
        handler,
    };
    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, server_shutdown)
            .await
            .expect("ingest server failed");
    });

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}

/// Send an HTTP request over TCP and return the status code and body
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    content_type: &str,
    body: Option<String>,
) -> Result<(Response<()>, String), Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let body = body.unwrap_or_default();
    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", content_type)
        .header("Content-Length", body.len().to_string())
        .body(Full::new(Bytes::from(body)))?;

    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    let (parts, incoming) = response.into_parts();
    let bytes = incoming.collect().await?.to_bytes();
    Ok((
        Response::from_parts(parts, ()),
        String::from_utf8(bytes.to_vec())?,
    ))
}
