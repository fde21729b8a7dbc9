//! Notification payload types carried by [`super::DeckEvent::Notification`]

use serde::{Deserialize, Serialize};

/// Severity of a user-facing notification (toast)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Failure,
    Info,
}

/// Navigation hint for the client that originated a submission
///
/// Clients wait `delay_ms` before navigating so the success toast stays
/// visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHint {
    pub path: String,
    pub delay_ms: u64,
}

/// Summary of a bulk rerun, also returned by `POST /analysis/rerun`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunSummary {
    /// Submissions re-dispatched successfully
    pub processed: usize,
    /// Submissions that could not be reset or dispatched
    pub failed: usize,
    /// Rerun-eligible submissions found by the scan
    pub total: usize,
}
