//! kalorix-catalog - food nutrition catalog service
//!
//! Serves the public search and import endpoints and the admin curation API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kalorix_catalog::api::AdminCredentials;
use kalorix_catalog::ingest::IngestSettings;
use kalorix_catalog::source::OpenFoodFactsClient;
use kalorix_catalog::store::SqliteCatalogStore;
use kalorix_catalog::{build_router, AppState};
use kalorix_common::config::{resolve_config_path, TomlConfig};
use kalorix_common::db::init_database;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for kalorix-catalog
#[derive(Parser, Debug)]
#[command(name = "kalorix-catalog")]
#[command(about = "Food nutrition catalog service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "KALORIX_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "KALORIX_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(short, long, env = "KALORIX_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before tracing so the configured level can seed the filter;
    // everything about the load is logged once the subscriber is up
    let config_path = resolve_config_path(args.config.as_deref());
    let config =
        TomlConfig::load_from(config_path.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Kalorix catalog (kalorix-catalog) v{}",
        env!("CARGO_PKG_VERSION")
    );

    match &config_path {
        Some(path) => info!("Loaded config file: {}", path.display()),
        None => info!("No config file found, using built-in defaults"),
    }
    for warning in config.startup_warnings() {
        warn!("{}", warning);
    }

    let db_path = args.database.unwrap_or_else(|| config.database_path());
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("✓ Database ready");

    let source = OpenFoodFactsClient::new(&config.source)
        .context("Failed to build Open Food Facts client")?;

    let admin = config
        .admin
        .credentials()
        .map(|(user, pass)| AdminCredentials::new(user, pass));

    let state = AppState::new(
        Arc::new(SqliteCatalogStore::new(pool)),
        Arc::new(source),
        admin,
        IngestSettings::from(&config.source),
    );
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", config.bind_address, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("kalorix-catalog listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
