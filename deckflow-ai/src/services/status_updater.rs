//! Status updater: the only writer of a submission's analysis fields
//!
//! State machine: `pending -> processing -> {completed, failed}`, with an
//! explicit rerun moving terminal submissions back to `processing`. Every
//! entry into `processing` bumps `analysis_generation`; terminal writes name
//! the generation they belong to and are discarded once it is stale.

use deckflow_common::config::PipelineConfig;
use deckflow_common::{AnalysisStatus, Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::notifier::{Notifier, Transition};
use crate::db::{companies, submissions};
use crate::models::{Evaluation, ExtractionResult, Routine, StatusUpdate};
use crate::utils::sanitize_error;

/// Error recorded for submissions cut off by a restart
pub const INTERRUPTED_ERROR: &str = "interrupted by service restart";

/// Result of asking to start processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// This caller owns the new generation and must dispatch it
    Started { generation: i64 },
    AlreadyProcessing,
    AlreadyTerminal(AnalysisStatus),
}

/// Result of a terminal write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Submission left `processing` or moved to a newer generation
    Discarded,
}

pub struct StatusUpdater {
    db: SqlitePool,
    notifier: Arc<Notifier>,
    consistency_delay: Duration,
    rerun_batch_size: usize,
}

impl StatusUpdater {
    pub fn new(db: SqlitePool, notifier: Arc<Notifier>, pipeline: &PipelineConfig) -> Self {
        Self {
            db,
            notifier,
            consistency_delay: Duration::from_millis(pipeline.consistency_delay_ms),
            rerun_batch_size: pipeline.rerun_batch_size,
        }
    }

    /// `pending -> processing`
    ///
    /// Waits out the consistency delay, re-reads the submission, then
    /// compare-and-sets. Concurrent callers for one submission get exactly
    /// one `Started`.
    pub async fn begin_processing(&self, submission_id: Uuid) -> Result<BeginOutcome> {
        if !self.consistency_delay.is_zero() {
            tokio::time::sleep(self.consistency_delay).await;
        }

        let current = self.current_status(submission_id).await?;
        if current != AnalysisStatus::Pending {
            return Ok(settled(current));
        }

        match submissions::mark_processing_if_pending(&self.db, submission_id).await? {
            Some(generation) => {
                info!(submission_id = %submission_id, generation, "Analysis started");
                self.notifier
                    .status_changed(&Transition {
                        submission_id,
                        previous: AnalysisStatus::Pending,
                        status: AnalysisStatus::Processing,
                        company_id: None,
                        company_name: None,
                        error: None,
                    })
                    .await;
                Ok(BeginOutcome::Started { generation })
            }
            // Lost the race to another trigger
            None => Ok(settled(self.current_status(submission_id).await?)),
        }
    }

    /// `processing -> completed` for a well-formed result
    ///
    /// Stores the raw result, converts scores once and materializes the
    /// company together with the status flip. An invalid result or a
    /// materialization error fails the submission instead.
    pub async fn complete(
        &self,
        submission_id: Uuid,
        generation: i64,
        routine: Routine,
        result: &ExtractionResult,
        fallback_name: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let evaluation = match Evaluation::from_result(result, routine, fallback_name) {
            Ok(evaluation) => evaluation,
            Err(reason) => {
                let error = format!("extraction failed: malformed result: {}", reason);
                return self.fail(submission_id, generation, &error).await;
            }
        };

        let raw = serde_json::to_value(result)?;
        if !submissions::record_result(&self.db, submission_id, generation, &raw).await? {
            debug!(submission_id = %submission_id, generation, "Discarding stale result");
            return Ok(TransitionOutcome::Discarded);
        }

        match companies::materialize_company(&self.db, submission_id, generation, &evaluation).await {
            Ok(Some(company_id)) => {
                info!(
                    submission_id = %submission_id,
                    company_id = %company_id,
                    overall_score = evaluation.overall_score,
                    routine = routine.function_name(),
                    "Analysis completed"
                );
                self.notifier
                    .status_changed(&Transition {
                        submission_id,
                        previous: AnalysisStatus::Processing,
                        status: AnalysisStatus::Completed,
                        company_id: Some(company_id),
                        company_name: Some(evaluation.company_name.clone()),
                        error: None,
                    })
                    .await;
                Ok(TransitionOutcome::Applied)
            }
            Ok(None) => {
                debug!(submission_id = %submission_id, generation, "Discarding stale result");
                Ok(TransitionOutcome::Discarded)
            }
            Err(e) => {
                warn!(submission_id = %submission_id, error = %e, "Company materialization failed");
                let error = format!("materialization failed: {}", e);
                self.fail(submission_id, generation, &error).await
            }
        }
    }

    /// `processing -> failed`
    pub async fn fail(
        &self,
        submission_id: Uuid,
        generation: i64,
        error: &str,
    ) -> Result<TransitionOutcome> {
        let error = sanitize_error(error);
        let applied = submissions::update_status(
            &self.db,
            submission_id,
            &StatusUpdate::failed(error.clone()),
            Some(generation),
        )
        .await?;

        if !applied {
            debug!(submission_id = %submission_id, generation, "Discarding stale failure");
            return Ok(TransitionOutcome::Discarded);
        }

        warn!(submission_id = %submission_id, error = %error, "Analysis failed");
        self.notifier
            .status_changed(&Transition {
                submission_id,
                previous: AnalysisStatus::Processing,
                status: AnalysisStatus::Failed,
                company_id: None,
                company_name: None,
                error: Some(error),
            })
            .await;
        Ok(TransitionOutcome::Applied)
    }

    /// Terminal -> `processing` for a rerun
    ///
    /// `candidates` pairs each id with the terminal status it was seen in.
    /// Returns the ids actually reset with their new generation.
    pub async fn begin_rerun(&self, candidates: &[(Uuid, AnalysisStatus)]) -> Result<Vec<(Uuid, i64)>> {
        let ids: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
        let reset = submissions::reset_for_rerun(&self.db, &ids, self.rerun_batch_size).await?;

        for (submission_id, generation) in &reset {
            let previous = candidates
                .iter()
                .find(|(id, _)| id == submission_id)
                .map(|(_, status)| *status)
                .unwrap_or(AnalysisStatus::Failed);

            debug!(submission_id = %submission_id, generation, "Reset for rerun");
            self.notifier
                .status_changed(&Transition {
                    submission_id: *submission_id,
                    previous,
                    status: AnalysisStatus::Processing,
                    company_id: None,
                    company_name: None,
                    error: None,
                })
                .await;
        }

        Ok(reset)
    }

    /// Fail submissions a previous process left in `processing`
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let ids = submissions::fail_interrupted(&self.db, INTERRUPTED_ERROR).await?;

        for submission_id in &ids {
            self.notifier
                .status_changed(&Transition {
                    submission_id: *submission_id,
                    previous: AnalysisStatus::Processing,
                    status: AnalysisStatus::Failed,
                    company_id: None,
                    company_name: None,
                    error: Some(INTERRUPTED_ERROR.to_string()),
                })
                .await;
        }

        if !ids.is_empty() {
            warn!(count = ids.len(), "Marked interrupted analyses as failed");
        }
        Ok(ids.len())
    }

    async fn current_status(&self, submission_id: Uuid) -> Result<AnalysisStatus> {
        submissions::load_submission(&self.db, submission_id)
            .await?
            .map(|s| s.analysis_status)
            .ok_or_else(|| Error::NotFound(format!("Submission {}", submission_id)))
    }
}

fn settled(status: AnalysisStatus) -> BeginOutcome {
    match status {
        AnalysisStatus::Completed | AnalysisStatus::Failed => BeginOutcome::AlreadyTerminal(status),
        AnalysisStatus::Pending | AnalysisStatus::Processing => BeginOutcome::AlreadyProcessing,
    }
}
