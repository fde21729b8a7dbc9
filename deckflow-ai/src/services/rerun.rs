//! Reruns of failed and low-scoring analyses
//!
//! A submission is rerun-eligible when its analysis failed, or when it
//! completed with an overall score below the quality threshold of its
//! routine family.

use deckflow_common::config::PipelineConfig;
use deckflow_common::events::RerunSummary;
use deckflow_common::{AnalysisStatus, Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::analysis_router::{AnalysisRouter, DispatchAck, RouterError};
use super::notifier::Notifier;
use super::status_updater::StatusUpdater;
use crate::db::submissions::{self, RerunCandidate};
use crate::models::Routine;

#[derive(Clone)]
pub struct RerunService {
    db: SqlitePool,
    router: AnalysisRouter,
    updater: Arc<StatusUpdater>,
    notifier: Arc<Notifier>,
    default_threshold: f64,
    thresholds: HashMap<String, f64>,
    rerun_delay: Duration,
}

impl RerunService {
    pub fn new(
        db: SqlitePool,
        router: AnalysisRouter,
        updater: Arc<StatusUpdater>,
        notifier: Arc<Notifier>,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            router,
            updater,
            notifier,
            default_threshold: pipeline.default_quality_threshold,
            thresholds: pipeline.quality_thresholds.clone(),
            rerun_delay: Duration::from_millis(pipeline.rerun_delay_ms),
        }
    }

    fn threshold(&self, routine: Routine) -> f64 {
        self.thresholds
            .get(routine.family())
            .copied()
            .unwrap_or(self.default_threshold)
    }

    fn is_eligible(&self, candidate: &RerunCandidate, routine: Routine) -> bool {
        match candidate.status {
            AnalysisStatus::Failed => true,
            AnalysisStatus::Completed => candidate
                .overall_score
                .map_or(true, |score| score < self.threshold(routine)),
            AnalysisStatus::Pending | AnalysisStatus::Processing => false,
        }
    }

    /// Rerun-eligible submissions, optionally limited to one routine family
    pub async fn find_eligible(&self, family: Option<Routine>) -> Result<Vec<RerunCandidate>> {
        let candidates = submissions::list_rerun_candidates(&self.db).await?;

        Ok(candidates
            .into_iter()
            .filter(|c| {
                let routine = self.router.route(&c.form_slug);
                family.map_or(true, |f| f == routine) && self.is_eligible(c, routine)
            })
            .collect())
    }

    /// Reset and re-dispatch every eligible submission, one at a time
    ///
    /// Dispatches are spaced by the configured rerun delay. The loop runs on
    /// its own task, so dropping the returned future does not stop it halfway.
    /// The summary counts `total` eligible submissions, `processed`
    /// re-dispatched and `failed` that could not be reset or dispatched.
    pub async fn rerun_all(&self, family: Option<Routine>) -> Result<RerunSummary> {
        let eligible = self.find_eligible(family).await?;
        info!(total = eligible.len(), family = family.map(|f| f.family()), "Starting bulk rerun");

        let service = self.clone();
        tokio::spawn(async move { service.dispatch_each(eligible).await })
            .await
            .map_err(|e| Error::Internal(format!("bulk rerun task failed: {}", e)))
    }

    async fn dispatch_each(&self, eligible: Vec<RerunCandidate>) -> RerunSummary {
        let mut summary = RerunSummary {
            processed: 0,
            failed: 0,
            total: eligible.len(),
        };

        for (index, candidate) in eligible.iter().enumerate() {
            if index > 0 && !self.rerun_delay.is_zero() {
                tokio::time::sleep(self.rerun_delay).await;
            }

            if self.dispatch_candidate(candidate).await {
                summary.processed += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            total = summary.total,
            "Bulk rerun dispatched"
        );
        self.notifier.rerun_completed(summary);
        summary
    }

    /// Reset one candidate and spawn its job; a row reset but not
    /// dispatched is failed again
    async fn dispatch_candidate(&self, candidate: &RerunCandidate) -> bool {
        let submission_id = candidate.id;
        let generation = match self.updater.begin_rerun(&[(submission_id, candidate.status)]).await {
            Ok(reset) => match reset.first() {
                Some((_, generation)) => *generation,
                None => {
                    debug!(submission_id = %submission_id, "Moved by another writer before rerun");
                    return false;
                }
            },
            Err(e) => {
                warn!(submission_id = %submission_id, error = %e, "Rerun reset failed");
                return false;
            }
        };

        let reason = match submissions::load_submission(&self.db, submission_id).await {
            Ok(Some(submission)) => {
                self.router.dispatch_prepared(submission, generation);
                return true;
            }
            Ok(None) => {
                warn!(submission_id = %submission_id, "Submission vanished before rerun dispatch");
                return false;
            }
            Err(e) => format!("rerun dispatch failed: {}", e),
        };

        warn!(submission_id = %submission_id, error = %reason, "Rerun dispatch failed");
        if let Err(e) = self.updater.fail(submission_id, generation, &reason).await {
            error!(submission_id = %submission_id, error = %e, "Could not fail undispatched rerun");
        }
        false
    }

    /// Rerun a single submission regardless of its score
    ///
    /// Pending submissions are simply triggered; a submission already
    /// processing is acknowledged without a new job.
    pub async fn rerun_one(
        &self,
        submission_id: Uuid,
    ) -> std::result::Result<(DispatchAck, Option<tokio::task::JoinHandle<()>>), RouterError> {
        let submission = submissions::load_submission(&self.db, submission_id)
            .await?
            .ok_or(RouterError::NotFound(submission_id))?;
        let routine = self.router.route(&submission.form_slug);

        match submission.analysis_status {
            AnalysisStatus::Pending => {
                let dispatch = self.router.trigger(submission_id).await?;
                Ok((dispatch.ack, dispatch.handle))
            }
            AnalysisStatus::Processing => Ok((
                DispatchAck {
                    submission_id,
                    routine,
                    dispatched: false,
                    status: AnalysisStatus::Processing,
                },
                None,
            )),
            status @ (AnalysisStatus::Completed | AnalysisStatus::Failed) => {
                let reset = self.updater.begin_rerun(&[(submission_id, status)]).await?;
                let Some((_, generation)) = reset.first().copied() else {
                    // Someone else moved it first
                    let current = submissions::load_submission(&self.db, submission_id)
                        .await?
                        .ok_or(RouterError::NotFound(submission_id))?;
                    return Ok((
                        DispatchAck {
                            submission_id,
                            routine,
                            dispatched: false,
                            status: current.analysis_status,
                        },
                        None,
                    ));
                };

                let submission = submissions::load_submission(&self.db, submission_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Submission {}", submission_id)))?;
                let handle = self.router.dispatch_prepared(submission, generation);
                info!(submission_id = %submission_id, generation, "Rerun dispatched");

                Ok((
                    DispatchAck {
                        submission_id,
                        routine,
                        dispatched: true,
                        status: AnalysisStatus::Processing,
                    },
                    Some(handle),
                ))
            }
        }
    }
}
