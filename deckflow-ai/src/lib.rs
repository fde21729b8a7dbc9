//! deckflow-ai library interface
//!
//! Exposes the service graph and router for the binary and integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use deckflow_common::config::{AuthConfig, TomlConfig};
use deckflow_common::events::EventBus;
use deckflow_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::services::{
    AnalysisRouter, BlobStore, ExtractionService, IntakeService, Notifier, QueryCache,
    RerunService, RoutingTable, StatusUpdater,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting and in-process watchers
    pub event_bus: EventBus,
    pub auth: Arc<AuthConfig>,
    pub cache: Arc<QueryCache>,
    pub notifier: Arc<Notifier>,
    pub updater: Arc<StatusUpdater>,
    pub router: AnalysisRouter,
    pub rerun: Arc<RerunService>,
    pub intake: Arc<IntakeService>,
    pub blobs: Arc<dyn BlobStore>,
    /// Chunk size for id lists bound into one statement
    pub batch_size: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background error, reported by `/health`
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the pipeline services together
    ///
    /// Fails only on invalid configuration (unknown routine in
    /// `pipeline.slug_routes`).
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: &TomlConfig,
        extractor: Arc<dyn ExtractionService>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let table = RoutingTable::with_overrides(&config.pipeline.slug_routes)?;
        let last_error = Arc::new(RwLock::new(None));

        let cache = Arc::new(QueryCache::new());
        let notifier = Arc::new(Notifier::new(
            event_bus.clone(),
            Arc::clone(&cache),
            &config.notifications,
        )?);
        let updater = Arc::new(StatusUpdater::new(
            db.clone(),
            Arc::clone(&notifier),
            &config.pipeline,
        ));
        let router = AnalysisRouter::new(
            db.clone(),
            table,
            Arc::clone(&updater),
            extractor,
            Arc::clone(&blobs),
            Duration::from_secs(config.extraction.timeout_secs),
            Arc::clone(&last_error),
        );
        let rerun = Arc::new(RerunService::new(
            db.clone(),
            router.clone(),
            Arc::clone(&updater),
            Arc::clone(&notifier),
            &config.pipeline,
        ));
        let intake = Arc::new(IntakeService::new(
            db.clone(),
            Arc::clone(&blobs),
            Arc::clone(&notifier),
            router.clone(),
            config.extraction.max_document_bytes,
        ));

        Ok(Self {
            db,
            event_bus,
            auth: Arc::new(config.auth.clone()),
            cache,
            notifier,
            updater,
            router,
            rerun,
            intake,
            blobs,
            batch_size: config.pipeline.rerun_batch_size,
            startup_time: Utc::now(),
            last_error,
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::intake_routes())
        .merge(api::analysis_routes())
        .merge(api::submission_routes())
        .merge(api::company_routes())
        .merge(api::form_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .with_state(state)
}
