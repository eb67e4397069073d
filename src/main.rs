#![forbid(unsafe_code)]

//! `channel-pilot` — chat-channel game automation server binary.
//!
//! Bootstraps configuration, the account store, the handler registry,
//! and the operator HTTP API, then runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use channel_pilot::config::GlobalConfig;
use channel_pilot::events::{spawn_log_subscriber, EventBus};
use channel_pilot::handlers;
use channel_pilot::http::{router, AppState};
use channel_pilot::manager::{AccountManager, AccountStore, InstanceDirectory};
use channel_pilot::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "channel-pilot", about = "Chat-channel game automation server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("channel-pilot server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let settings = Arc::new(GlobalConfig::load(&args.config)?);
    info!("configuration loaded");

    // ── Core services ───────────────────────────────────
    let events = EventBus::new();
    let log_handle = spawn_log_subscriber(&events);

    let store = AccountStore::open(&settings.storage_path);
    let accounts = Arc::new(AccountManager::load(store, events.clone()));
    info!(count = accounts.list().len(), "account store loaded");

    let registry = Arc::new(handlers::build_registry()?);
    let directory = Arc::new(InstanceDirectory::new());
    let reset_handle = directory.spawn_midnight_reset();

    let state = Arc::new(AppState {
        accounts: Arc::clone(&accounts),
        directory: Arc::clone(&directory),
        registry,
        events,
        settings: Arc::clone(&settings),
    });

    // ── Serve the operator API ──────────────────────────
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("cannot bind {addr}: {err}")))?;
    info!(%addr, "operator API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Config(format!("server error: {err}")))?;

    // ── Graceful shutdown ───────────────────────────────
    info!("shutdown signal received");
    directory.close_all().await;
    accounts.persist();
    reset_handle.abort();
    log_handle.abort();
    info!("channel-pilot shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,channel_pilot=debug"));
    let builder = fmt().with_env_filter(filter);
    let init = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    init.map_err(|err| AppError::Config(format!("tracing init failed: {err}")))
}
