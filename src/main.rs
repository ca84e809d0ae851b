// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! HLS swarm entry point.
//!
//! Loads the configuration, brings up the fleet, logs a one-line aggregate
//! summary every second, and shuts everything down on SIGINT/SIGTERM or
//! once every client has finished.

use clap::Parser;
use hls_swarm_config::{ClientId, SwarmConfig};
use hls_swarm_supervisor::{ClientManager, ClientState, FetcherCommand, SwarmObserver};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for supervisors before abandoning them.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "swarm", version, about = "HLS load-testing swarm")]
struct Args {
    /// Configuration file (YAML or JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of clients.
    #[arg(long)]
    clients: Option<u64>,

    /// Override the origin playlist URL.
    #[arg(long)]
    origin: Option<String>,
}

/// Logs lifecycle callbacks; the dashboard and exporter collaborators are
/// wired in here when present.
struct LogObserver;

impl SwarmObserver for LogObserver {
    fn on_client_start(&self, client_id: ClientId, pid: u32) {
        tracing::info!(client_id, pid, "client started");
    }

    fn on_client_exit(&self, client_id: ClientId, exit_code: Option<i32>, uptime: Duration) {
        tracing::info!(client_id, ?exit_code, ?uptime, "client exited");
    }

    fn on_client_restart(&self, client_id: ClientId, attempt: u32, delay: Duration) {
        tracing::info!(client_id, attempt, ?delay, "client restarting");
    }

    fn on_state_change(&self, client_id: ClientId, old: ClientState, new: ClientState) {
        tracing::debug!(client_id, %old, %new, "client state change");
    }
}

fn load_config(args: &Args) -> Result<SwarmConfig> {
    let mut config = match &args.config {
        Some(path) => SwarmConfig::from_file(path)?,
        None => SwarmConfig::default(),
    };
    if let Some(clients) = args.clients {
        config.clients = clients;
    }
    if let Some(origin) = &args.origin {
        config.fetcher.origin_url = origin.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let fetcher = config.fetcher.clone();

    let manager = Arc::new(
        ClientManager::new(
            config,
            Arc::new(FetcherCommand::new(fetcher)),
            Arc::new(LogObserver),
        )
        .into_diagnostic()?,
    );
    tracing::info!(
        seed = manager.seed(),
        estimated_ramp = ?manager.estimated_ramp_duration(),
        "starting swarm"
    );

    let ramp = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });

    let aggregator = manager.aggregator();
    let mut sigterm = signal(SignalKind::terminate()).into_diagnostic()?;
    let mut summary = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = summary.tick() => {
                let snap = aggregator.aggregate();
                tracing::info!(
                    active = manager.active_count(),
                    segments = snap.counters.segment_requests,
                    manifests = snap.counters.manifest_requests,
                    bytes = snap.counters.total_bytes,
                    bytes_per_sec = snap.bytes_per_second_instant,
                    stalled = snap.stalled_clients,
                    drifting = snap.drifting_clients,
                    http_errors = snap.counters.http_errors,
                    degraded = snap.metrics_degraded,
                    "fleet"
                );
                if ramp.is_finished() && manager.all_finished() {
                    tracing::info!("all clients finished");
                    break;
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::warn!(%error, "signal handler failed");
                }
                tracing::info!("interrupted; shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("terminated; shutting down");
                break;
            }
        }
    }

    if let Err(error) = manager.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::warn!(%error, "unclean shutdown");
    }
    let final_snap = aggregator.aggregate();
    tracing::info!(
        clients = final_snap.total_clients,
        bytes = final_snap.counters.total_bytes,
        restarts = final_snap.counters.process_starts.saturating_sub(final_snap.total_clients as u64),
        peak_drop_rate = final_snap.peak_drop_rate,
        "run complete"
    );
    Ok(())
}
