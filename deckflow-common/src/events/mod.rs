//! Event types for the Deckflow event system
//!
//! Provides the shared event definitions and the in-process `EventBus`.
//! The analysis service emits events here; SSE streams and status watchers
//! subscribe.

mod notification_types;

pub use notification_types::{NotificationLevel, RedirectHint, RerunSummary};

use crate::api::AnalysisStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Deckflow event types
///
/// Events are broadcast via EventBus and serialized as-is for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeckEvent {
    /// A submission was stored by an intake entrypoint
    ///
    /// Triggers:
    /// - SSE: Insert row in submission lists
    SubmissionCreated {
        submission_id: Uuid,
        /// `upload`, `public_form` or `email`
        source: String,
        form_slug: String,
        timestamp: DateTime<Utc>,
    },

    /// Analysis status transition recorded by the status updater
    ///
    /// Triggers:
    /// - SSE: Refresh submission lists and status badges
    /// - Status watchers: Push-path delivery
    SubmissionStatusChanged {
        submission_id: Uuid,
        status: AnalysisStatus,
        previous_status: AnalysisStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// User-facing notification (toast) for a submission
    Notification {
        submission_id: Uuid,
        level: NotificationLevel,
        title: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redirect: Option<RedirectHint>,
        timestamp: DateTime<Utc>,
    },

    /// Bulk rerun finished dispatching
    RerunCompleted {
        summary: RerunSummary,
        timestamp: DateTime<Utc>,
    },
}

impl DeckEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DeckEvent::SubmissionCreated { .. } => "SubmissionCreated",
            DeckEvent::SubmissionStatusChanged { .. } => "SubmissionStatusChanged",
            DeckEvent::Notification { .. } => "Notification",
            DeckEvent::RerunCompleted { .. } => "RerunCompleted",
        }
    }

    /// Submission this event concerns, if any
    pub fn submission_id(&self) -> Option<Uuid> {
        match self {
            DeckEvent::SubmissionCreated { submission_id, .. }
            | DeckEvent::SubmissionStatusChanged { submission_id, .. }
            | DeckEvent::Notification { submission_id, .. } => Some(*submission_id),
            DeckEvent::RerunCompleted { .. } => None,
        }
    }
}

/// Broadcast bus for [`DeckEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeckEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events buffered per subscriber before the
    ///   slowest subscriber starts losing old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DeckEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: DeckEvent) -> Result<usize, broadcast::error::SendError<DeckEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DeckEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
