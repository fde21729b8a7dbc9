//! Notification fan-out
//!
//! Every recorded transition goes through [`Notifier::status_changed`]:
//! cache invalidation, then the bus event, then a user-facing notification
//! for terminal states. Everything here is best-effort and never fails the
//! transition that triggered it.

use chrono::Utc;
use deckflow_common::config::NotificationConfig;
use deckflow_common::events::{
    DeckEvent, EventBus, NotificationLevel, RedirectHint, RerunSummary,
};
use deckflow_common::{AnalysisStatus, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::QueryCache;
use crate::models::Submission;

/// A status change recorded by the status updater
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub submission_id: Uuid,
    pub previous: AnalysisStatus,
    pub status: AnalysisStatus,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub error: Option<String>,
}

pub struct Notifier {
    event_bus: EventBus,
    cache: Arc<QueryCache>,
    http_client: reqwest::Client,
    webhook_url: Option<String>,
    redirect_delay_ms: u64,
}

impl Notifier {
    pub fn new(
        event_bus: EventBus,
        cache: Arc<QueryCache>,
        config: &NotificationConfig,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            event_bus,
            cache,
            http_client,
            webhook_url: config.webhook_url.clone(),
            redirect_delay_ms: config.redirect_delay_ms,
        })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Publish a recorded transition
    pub async fn status_changed(&self, transition: &Transition) {
        self.cache.invalidate_submission(transition.submission_id).await;

        let now = Utc::now();
        self.event_bus.emit_lossy(DeckEvent::SubmissionStatusChanged {
            submission_id: transition.submission_id,
            status: transition.status,
            previous_status: transition.previous,
            company_id: transition.company_id,
            company_name: transition.company_name.clone(),
            error: transition.error.clone(),
            timestamp: now,
        });

        let notification = match transition.status {
            AnalysisStatus::Completed => DeckEvent::Notification {
                submission_id: transition.submission_id,
                level: NotificationLevel::Success,
                title: "Analysis complete".to_string(),
                message: match &transition.company_name {
                    Some(name) => format!("{} has been analyzed", name),
                    None => "Your pitch deck has been analyzed".to_string(),
                },
                redirect: transition.company_id.map(|id| RedirectHint {
                    path: format!("/companies/{}", id),
                    delay_ms: self.redirect_delay_ms,
                }),
                timestamp: now,
            },
            AnalysisStatus::Failed => DeckEvent::Notification {
                submission_id: transition.submission_id,
                level: NotificationLevel::Failure,
                title: "Analysis failed".to_string(),
                message: transition
                    .error
                    .clone()
                    .unwrap_or_else(|| "Analysis failed".to_string()),
                redirect: None,
                timestamp: now,
            },
            AnalysisStatus::Pending | AnalysisStatus::Processing => return,
        };

        self.post_webhook(&notification);
        self.event_bus.emit_lossy(notification);
    }

    /// Publish a newly stored submission
    pub async fn submission_created(&self, submission: &Submission) {
        self.cache.invalidate_group(super::CacheGroup::Submissions).await;
        self.cache
            .invalidate_group(super::CacheGroup::PublicSubmissions)
            .await;

        self.event_bus.emit_lossy(DeckEvent::SubmissionCreated {
            submission_id: submission.id,
            source: submission.source.as_str().to_string(),
            form_slug: submission.form_slug.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn rerun_completed(&self, summary: RerunSummary) {
        let event = DeckEvent::RerunCompleted {
            summary,
            timestamp: Utc::now(),
        };
        self.post_webhook(&event);
        self.event_bus.emit_lossy(event);
    }

    fn post_webhook(&self, event: &DeckEvent) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.http_client.clone();
        let event = event.clone();

        tokio::spawn(async move {
            let event_type = event.event_type();
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(event_type, "Webhook notification delivered");
                }
                Ok(resp) => {
                    tracing::warn!(event_type, status = %resp.status(), "Webhook notification rejected");
                }
                Err(e) => {
                    tracing::warn!(event_type, error = %e, "Webhook notification failed");
                }
            }
        });
    }
}
