mod config;
mod error;
mod http;
mod indicator;
mod ingest;
mod model;
mod query;
mod retention;
mod storage;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use http::AppState;
use indicator::engine::IndicatorEngine;
use ingest::IngestService;
use query::QueryService;
use retention::RetentionPolicy;
use storage::Storage;
use storage::memory::MemoryStorage;
use storage::sqlite::SqliteStorage;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("indicator setup error")]
    Indicator,
    #[display("server error")]
    Server,
}

#[derive(Parser)]
#[command(name = "tick-ingest", about = "Tick ingestion and indicator service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let storage = open_storage(&config).await?;

    // ── Services ──────────────────────────────────────────────────────────────
    let engine =
        IndicatorEngine::new(config.indicators.rsi_period).change_context(AppError::Indicator)?;
    let retention = RetentionPolicy::from_days(config.retention.window_days);

    let state = AppState {
        ingest: Arc::new(IngestService::new(Arc::clone(&storage), retention, engine)),
        query: Arc::new(QueryService::new(storage)),
    };

    // ── Server ────────────────────────────────────────────────────────────────
    let addr = config
        .server
        .socket_addr()
        .change_context(AppError::Config)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .change_context(AppError::Server)
        .attach_with(|| format!("bind_addr: {addr}"))?;

    info!(
        %addr,
        backend = %config.storage.backend,
        retention_days = retention.window().num_days(),
        "tick-ingest listening"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(cancel.clone()));

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .change_context(AppError::Server)?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
        return;
    }
    info!("ctrl+c received, shutting down");
    cancel.cancel();
}

async fn open_storage(config: &AppConfig) -> Result<Arc<dyn Storage>, Report<AppError>> {
    match config.storage.backend.as_str() {
        "memory" => {
            tracing::warn!("memory backend selected; ticks are lost on exit");
            Ok(Arc::new(MemoryStorage::new()))
        }
        _ => {
            let data_dir = &config.general.data_dir;
            std::fs::create_dir_all(data_dir)
                .change_context(AppError::Storage)
                .attach_with(|| format!("data_dir: {data_dir}"))?;

            let db_path = format!("{data_dir}/ticks.db");
            let storage = SqliteStorage::open(Path::new(&db_path))
                .await
                .change_context(AppError::Storage)?;
            Ok(Arc::new(storage))
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
