//! Event router service.
//!
//! Accepts JSON events posted on `POST /v0/events?name=<datasource>`
//! and forwards them in batches to an ingestion endpoint,
//! one call per datasource per batch.

mod config;
mod logging;

use crate::config::EventRouterConfig;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::logging::log_init;
use crate::logging::LogConfigArgs;
use anyhow::Context;
use batcher::BatchError;
use batcher::BatchingService;
use camino::Utf8PathBuf;
use clap::Parser;
use event_router_ext::event_router;
use event_router_ext::BearerTokenAuthorizer;
use event_router_ext::FlushDispatcher;
use event_router_ext::HttpIngestSink;
use event_router_ext::RouterMetrics;
use event_router_ext::RouterServer;
use event_router_ext::RouterState;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Receives JSON events over HTTP and ingests them in batches.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: Utf8PathBuf,

    /// Address the HTTP server listens on, overriding `http.bind`
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Token expected from the clients posting events, overriding `http.auth_token`
    #[arg(long, env = "EVENT_ROUTER_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Token used to authenticate against the ingestion endpoint, overriding `sink.token`
    #[arg(long, env = "EVENT_ROUTER_SINK_TOKEN", hide_env_values = true)]
    sink_token: Option<String>,

    #[command(flatten)]
    log_args: LogConfigArgs,
}

impl Args {
    fn apply_to(&self, config: &mut EventRouterConfig) {
        if let Some(bind) = self.bind {
            config.http.bind = bind;
        }
        if let Some(token) = &self.auth_token {
            config.http.auth_token = Some(token.clone());
        }
        if let Some(token) = &self.sink_token {
            config.sink.token = Some(token.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = EventRouterConfig::try_new(&args.config)?;
    args.apply_to(&mut config);
    log_init(&args.log_args, config.log_level()?);

    run(config).await
}

async fn run(config: EventRouterConfig) -> anyhow::Result<()> {
    let auth_token = config.auth_token()?.to_string();
    let sink_url = config.sink_url()?;
    let batch_config = config.batch_config()?;
    let max_body_size = config.max_body_size()?;
    let shutdown_timeout = config.batch.shutdown_timeout;

    let sink_token = config.sink.token.clone().unwrap_or_default();
    if sink_token.is_empty() {
        warn!("No token configured for the ingestion endpoint");
    }
    let sink = HttpIngestSink::new(&sink_url, sink_token).context("creating the ingestion sink")?;

    let metrics = RouterMetrics::new().context("registering the metrics")?;
    let dispatcher = FlushDispatcher::new(
        Arc::new(sink),
        Arc::new(metrics.clone()),
        config.batch.flush_timeout,
    );
    info!(
        max_batch_size = batch_config.max_batch_size(),
        buffer_capacity = batch_config.buffer_capacity(),
        flush_interval = ?batch_config.flush_interval(),
        "Starting batcher"
    );
    let service = BatchingService::start(batch_config, dispatcher);

    let state = RouterState::new(
        service.batcher(),
        Arc::new(BearerTokenAuthorizer),
        auth_token,
        metrics.clone(),
    )
    .with_max_body_size(max_body_size);
    let server = RouterServer::try_bind(event_router(state), config.http.bind)?;
    info!(address = %server.local_addr(), sink = %sink_url, "Event router started");
    let handle = server.handle();
    let mut serving = tokio::spawn(server.wait());

    // The shutdown timeout bounds both the graceful HTTP shutdown and the drain
    let (server_failure, deadline) = tokio::select! {
        signal = shutdown_signal() => {
            match signal {
                Ok(()) => info!("Shutting down"),
                Err(err) => error!(error = %err, "Failed to listen for shutdown signals, shutting down"),
            }
            let deadline = Instant::now() + shutdown_timeout;
            handle.graceful_shutdown(Some(shutdown_timeout));
            ((&mut serving).await.ok().and_then(Result::err), deadline)
        }
        stopped = &mut serving => {
            let failure = match stopped {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(err) => Some(io::Error::other(err)),
            };
            (failure, Instant::now() + shutdown_timeout)
        }
    };
    if let Some(err) = &server_failure {
        error!(error = %err, "HTTP server stopped");
    }

    match service.drain(remaining_until(deadline, Instant::now())).await {
        Ok(()) => info!("All buffered events have been flushed"),
        Err(BatchError::DrainTimeout { timeout, pending }) => {
            error!(lost = pending, ?timeout, "Events not delivered before shutdown")
        }
        Err(err) => error!(error = %err, "Failed to flush buffered events"),
    }

    for (datasource, rows) in metrics.flushed_rows_snapshot() {
        info!(datasource = %datasource, rows, "Flushed rows");
    }

    match server_failure {
        Some(err) => Err(err).context("serving HTTP requests"),
        None => Ok(()),
    }
}

fn remaining_until(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
