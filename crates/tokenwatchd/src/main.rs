//! tokenwatchd: the eduMFA token metrics exporter.
//!
//! Single binary that assembles the exporter:
//! - Snapshot store (latest gauge values)
//! - Collector + scheduler (one database connection per cycle)
//! - HTTP endpoint (`/metrics`, `/healthz`)
//!
//! # Usage
//!
//! ```text
//! tokenwatchd run --db mysql://exporter:secret@db:3306/edumfa --interval 2m
//! ```

mod config;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tokenwatch_collector::{Collector, Scheduler, SqlStore, gauge_families};
use tokenwatch_metrics::SnapshotStore;

use crate::config::{ExporterConfig, LogFormat, RunArgs};

const DEFAULT_LOG_FILTER: &str = "info,tokenwatchd=debug,tokenwatch=debug";

#[derive(Parser)]
#[command(name = "tokenwatchd", about = "eduMFA token metrics exporter", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect token metrics on a schedule and serve them on /metrics.
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let config = args.resolve().context("invalid configuration")?;
            init_tracing(config.log_format);
            run_exporter(config).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn run_exporter(config: ExporterConfig) -> anyhow::Result<()> {
    info!(
        listen = %config.listen,
        interval = ?config.interval,
        "tokenwatch exporter starting"
    );

    // Installed before the first cycle so an early signal is not lost.
    let termination = termination_signal().context("installing signal handlers")?;
    tokio::pin!(termination);

    // ── Snapshot store ─────────────────────────────────────────

    let metrics = Arc::new(SnapshotStore::new(gauge_families()));

    // ── Collector + scheduler (first cycle runs here) ──────────

    let collector = Arc::new(Collector::new(
        SqlStore::new(config.database_url.clone()),
        &metrics,
    )?);
    let scheduler = Scheduler::new(config.interval)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = scheduler.start(collector, shutdown_rx).await;

    // ── Metrics endpoint ───────────────────────────────────────

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding metrics endpoint to {}", config.listen))?;
    info!(addr = %config.listen, "metrics endpoint listening");

    let router = tokenwatch_api::build_router(metrics);
    let mut server = tokio::spawn(async move { axum::serve(listener, router).await });

    // ── Wait for shutdown ──────────────────────────────────────

    let server_exit = tokio::select! {
        () = &mut termination => {
            info!("shutdown received");
            None
        }
        exit = &mut server => Some(exit),
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "collection scheduler task failed");
    }

    if let Some(exit) = server_exit {
        return match exit {
            Ok(Ok(())) => Err(anyhow!("metrics endpoint stopped unexpectedly")),
            Ok(Err(e)) => Err(e).context("metrics endpoint failed"),
            Err(e) => Err(e).context("metrics endpoint task failed"),
        };
    }

    // In-flight scrapes are not drained.
    server.abort();
    info!("tokenwatch exporter stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn termination_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn termination_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}
