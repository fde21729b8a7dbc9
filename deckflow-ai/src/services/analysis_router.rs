//! Analysis router
//!
//! Maps a submission's form slug to an extraction routine and dispatches the
//! extraction as a background task. Callers get an acknowledgement, never
//! the routine's result.

use deckflow_common::{AnalysisStatus, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::blob_store::BlobStore;
use super::extraction_client::{ExtractionError, ExtractionService};
use super::status_updater::{BeginOutcome, StatusUpdater, TransitionOutcome};
use crate::db::submissions;
use crate::models::{ExtractionRequest, Routine, Submission, EMAIL_SLUG};

/// Slug -> routine table; unknown slugs use [`Routine::PitchDeck`]
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Routine>,
}

impl RoutingTable {
    pub fn builtin() -> Self {
        let routes = [
            ("eureka-sample", Routine::EurekaForm),
            ("eureka", Routine::EurekaForm),
            ("barc-sample", Routine::BarcForm),
            ("barc", Routine::BarcForm),
            (EMAIL_SLUG, Routine::EmailPitch),
        ]
        .into_iter()
        .map(|(slug, routine)| (slug.to_string(), routine))
        .collect();

        Self { routes }
    }

    /// Built-in table with configured `slug -> routine` entries layered on top
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut table = Self::builtin();
        for (slug, routine) in overrides {
            let routine: Routine = routine.parse().map_err(|_| {
                Error::Config(format!(
                    "Unknown routine '{}' for slug '{}' in pipeline.slug_routes",
                    routine, slug
                ))
            })?;
            table.routes.insert(slug.clone(), routine);
        }
        Ok(table)
    }

    pub fn route(&self, form_slug: &str) -> Routine {
        self.routes
            .get(form_slug)
            .copied()
            .unwrap_or(Routine::PitchDeck)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Submission not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] Error),
}

/// What a trigger did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAck {
    pub submission_id: Uuid,
    pub routine: Routine,
    /// A new extraction job was spawned by this call
    pub dispatched: bool,
    /// Status after the call
    pub status: AnalysisStatus,
}

/// Acknowledgement plus the spawned job, if any
pub struct Dispatch {
    pub ack: DispatchAck,
    pub handle: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct AnalysisRouter {
    db: SqlitePool,
    table: Arc<RoutingTable>,
    updater: Arc<StatusUpdater>,
    extractor: Arc<dyn ExtractionService>,
    blobs: Arc<dyn BlobStore>,
    extraction_timeout: Duration,
    last_error: Arc<RwLock<Option<String>>>,
}

impl AnalysisRouter {
    pub fn new(
        db: SqlitePool,
        table: RoutingTable,
        updater: Arc<StatusUpdater>,
        extractor: Arc<dyn ExtractionService>,
        blobs: Arc<dyn BlobStore>,
        extraction_timeout: Duration,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            db,
            table: Arc::new(table),
            updater,
            extractor,
            blobs,
            extraction_timeout,
            last_error,
        }
    }

    pub fn route(&self, form_slug: &str) -> Routine {
        self.table.route(form_slug)
    }

    /// Start analysis of a submission if it is pending
    ///
    /// Idempotent: a submission already processing or finished is
    /// acknowledged without a new job.
    pub async fn trigger(&self, submission_id: Uuid) -> std::result::Result<Dispatch, RouterError> {
        let submission = submissions::load_submission(&self.db, submission_id)
            .await?
            .ok_or(RouterError::NotFound(submission_id))?;
        let routine = self.route(&submission.form_slug);

        let outcome = match self.updater.begin_processing(submission_id).await {
            Ok(outcome) => outcome,
            Err(Error::NotFound(_)) => return Err(RouterError::NotFound(submission_id)),
            Err(e) => return Err(e.into()),
        };

        let (status, handle) = match outcome {
            BeginOutcome::Started { generation } => (
                AnalysisStatus::Processing,
                Some(self.dispatch_prepared(submission, generation)),
            ),
            BeginOutcome::AlreadyProcessing => (AnalysisStatus::Processing, None),
            BeginOutcome::AlreadyTerminal(status) => (status, None),
        };

        info!(
            submission_id = %submission_id,
            routine = routine.function_name(),
            dispatched = handle.is_some(),
            status = %status,
            "Analysis trigger acknowledged"
        );

        Ok(Dispatch {
            ack: DispatchAck {
                submission_id,
                routine,
                dispatched: handle.is_some(),
                status,
            },
            handle,
        })
    }

    /// Spawn the extraction job for a submission already moved to
    /// `processing` at `generation`
    ///
    /// A job that panics is failed here so the submission does not stay in
    /// `processing`.
    pub fn dispatch_prepared(&self, submission: Submission, generation: i64) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            let submission_id = submission.id;
            let job = {
                let router = router.clone();
                tokio::spawn(async move { router.run_job(submission, generation).await })
            };

            match job.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(submission_id = %submission_id, error = %e, "Analysis job could not record its outcome");
                    router.record_error(format!("analysis of {}: {}", submission_id, e)).await;
                }
                Err(e) => {
                    error!(submission_id = %submission_id, error = %e, "Analysis job aborted");
                    let reason = format!("analysis job aborted: {}", e);
                    router.record_error(format!("analysis of {}: {}", submission_id, reason)).await;
                    if let Err(e) = router.updater.fail(submission_id, generation, &reason).await {
                        error!(submission_id = %submission_id, error = %e, "Could not fail aborted analysis");
                    }
                }
            }
        })
    }

    async fn run_job(&self, submission: Submission, generation: i64) -> Result<TransitionOutcome> {
        let submission_id = submission.id;
        let routine = self.route(&submission.form_slug);

        let document = match self.blobs.get(&submission.document_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = format!("extraction failed: document unavailable: {}", e);
                self.record_error(format!("analysis of {}: {}", submission_id, error)).await;
                return self.updater.fail(submission_id, generation, &error).await;
            }
        };

        let request = ExtractionRequest {
            routine,
            document_name: submission.document_name.clone(),
            document,
            context: routine.build_context(&submission),
        };

        let result = match tokio::time::timeout(self.extraction_timeout, self.extractor.extract(request)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(self.extraction_timeout.as_secs())),
        };

        match result {
            Ok(result) => {
                self.updater
                    .complete(
                        submission_id,
                        generation,
                        routine,
                        &result,
                        submission.company_name_hint.as_deref(),
                    )
                    .await
            }
            Err(e) => {
                warn!(
                    submission_id = %submission_id,
                    routine = routine.function_name(),
                    error = %e,
                    "Extraction failed"
                );
                let error = format!("extraction failed: {}", e);
                self.record_error(format!("analysis of {}: {}", submission_id, error)).await;
                self.updater.fail(submission_id, generation, &error).await
            }
        }
    }

    async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_routes() {
        let table = RoutingTable::builtin();
        assert_eq!(table.route("eureka-sample"), Routine::EurekaForm);
        assert_eq!(table.route("eureka"), Routine::EurekaForm);
        assert_eq!(table.route("barc-sample"), Routine::BarcForm);
        assert_eq!(table.route("barc"), Routine::BarcForm);
        assert_eq!(table.route("email-pitch"), Routine::EmailPitch);
        assert_eq!(table.route("xyz"), Routine::PitchDeck);
        assert_eq!(table.route(""), Routine::PitchDeck);
    }

    #[test]
    fn test_overrides_layer_over_builtin() {
        let mut overrides = HashMap::new();
        overrides.insert("accelerator".to_string(), "barc_form".to_string());
        overrides.insert("eureka".to_string(), "analyze-pdf".to_string());

        let table = RoutingTable::with_overrides(&overrides).unwrap();
        assert_eq!(table.route("accelerator"), Routine::BarcForm);
        assert_eq!(table.route("eureka"), Routine::PitchDeck);
        assert_eq!(table.route("eureka-sample"), Routine::EurekaForm);
    }

    #[test]
    fn test_unknown_override_routine_is_config_error() {
        let mut overrides = HashMap::new();
        overrides.insert("x".to_string(), "analyze-everything".to_string());
        assert!(matches!(
            RoutingTable::with_overrides(&overrides),
            Err(Error::Config(_))
        ));
    }
}
