//! deckflow-ai - pitch-deck submission analysis service
//!
//! Accepts decks through upload, public forms and inbound email, routes each
//! submission to an extraction routine, materializes company evaluations and
//! streams status changes over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deckflow_common::config::{self, TomlConfig};
use deckflow_common::events::EventBus;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use deckflow_ai::services::{FsBlobStore, HttpExtractionClient};
use deckflow_ai::AppState;

/// Command-line arguments for deckflow-ai
#[derive(Parser, Debug)]
#[command(name = "deckflow-ai")]
#[command(about = "Pitch-deck submission analysis service")]
#[command(version)]
struct Args {
    /// Root folder for the database and stored decks
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides `[server] port`)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut toml_config =
        TomlConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        toml_config.server.port = port;
    }
    config::init_logging(&toml_config.logging).context("Failed to initialize logging")?;

    info!("Starting deckflow-ai (submission analysis)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder);
    let db_pool = deckflow_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", db_path.display());

    let event_bus = EventBus::new(100);

    let blobs = Arc::new(FsBlobStore::new(root_folder.join("blobs")));
    let extraction = &toml_config.extraction;
    let api_key = toml_config.extraction_api_key();
    if api_key.is_none() {
        warn!("No extraction API key configured; requests are sent unauthenticated");
    }
    let extractor = Arc::new(
        HttpExtractionClient::new(
            &extraction.endpoint,
            &extraction.model,
            api_key,
            extraction.timeout_secs,
        )
        .context("Failed to build extraction client")?,
    );
    info!(endpoint = %extraction.endpoint, model = %extraction.model, "Extraction service configured");

    let state = AppState::new(db_pool, event_bus, &toml_config, extractor, blobs)
        .context("Invalid pipeline configuration")?;

    let recovered = state
        .updater
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted analyses")?;
    if recovered > 0 {
        info!(recovered, "Recovered submissions interrupted by the previous run");
    }

    let app = deckflow_ai::build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", toml_config.server.host, toml_config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
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
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
