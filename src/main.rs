#![forbid(unsafe_code)]

//! `attention-alert`: agent attention monitor service.
//!
//! Loads configuration, wires the alerting core, and serves the host
//! surface over a local IPC socket until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use attention_alert::app::AttentionSystem;
use attention_alert::ipc::server::spawn_ipc_server;
use attention_alert::{AlertConfig, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "attention-alert", about = "Agent attention monitor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to
    /// `./attention-alert.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("attention-alert bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = AlertConfig::load(args.config.as_deref());
    if !config.enabled {
        info!("attention alerts disabled by configuration; exiting");
        return Ok(());
    }
    config.load_credentials().await;
    info!(
        cooldown_seconds = config.cooldown_seconds,
        stall_timeout_seconds = config.stall_timeout_seconds,
        repeat_interval_seconds = config.repeat_interval_seconds,
        "configuration loaded"
    );

    // ── Build and start the alerting core ───────────────
    let system = Arc::new(AttentionSystem::build(config).await);
    system.start();

    // ── Start IPC server ────────────────────────────────
    let ct = CancellationToken::new();
    let ipc_handle = match spawn_ipc_server(Arc::clone(&system), ct.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(%err, "ipc server unavailable; running without host surface");
            None
        }
    };

    info!("attention-alert ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    system.shutdown().await;
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    info!("attention-alert shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
