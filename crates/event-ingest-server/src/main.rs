// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use event_ingest::{
    collector::ChannelCollector, config, event::Event, handler::IngestHandler,
    server::IngestServer,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("EVENT_INGEST_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on event ingest server startup: {e}");
            return;
        }
    };

    let (collector, event_rx) = ChannelCollector::new(config.collector_buffer_size);
    let writer_handle = tokio::spawn(write_events(event_rx));

    let handler = Arc::new(IngestHandler::new(Arc::new(collector), &config));
    let server = IngestServer {
        config: Arc::clone(&config),
        handler,
    };

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
        signal_shutdown.cancel();
    });

    info!(
        "event-ingest: starting to listen on {}{}",
        config.socket_addr(),
        config.endpoint_path
    );
    if let Err(e) = server.start(shutdown).await {
        error!("Error when running event ingest server: {e:?}");
    }

    // serve aborted in-flight connections on return; the channel closes once the
    // aborted tasks and the server release their collector handles
    drop(server);
    if let Err(e) = writer_handle.await {
        error!("Event writer task failed: {e}");
    }
}

/// Downstream end of the channel collector: writes every event as one JSON line to stdout.
async fn write_events(mut rx: Receiver<Event>) {
    let mut stdout = BufWriter::new(tokio::io::stdout());
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Unable to encode event {}: {e}", event.id());
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            error!("Unable to write event {}: {e}", event.id());
            continue;
        }
        // flush once the channel is drained so output is not held back
        if rx.is_empty() {
            if let Err(e) = stdout.flush().await {
                error!("Unable to flush events: {e}");
            }
        }
    }
    if let Err(e) = stdout.flush().await {
        error!("Unable to flush events: {e}");
    }
}
