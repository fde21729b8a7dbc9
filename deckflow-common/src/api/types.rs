//! Shared API request/response types
//!
//! Types exchanged between the analysis service and status observers
//! (the in-process watcher, the `deckflow-watch` CLI, browser clients).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Analysis lifecycle of a submission
///
/// `Pending -> Processing -> {Completed, Failed}`; terminal states only move
/// back to `Processing` through an explicit rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    /// Column representation used in the `submissions` table
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown analysis status: {}",
                other
            ))),
        }
    }
}

/// Short description of a completed analysis, attached to status responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub company_name: String,
    /// Canonical 0-5 score
    pub overall_score: f64,
    pub section_count: usize,
}

/// Status query response (`GET /submissions/{id}/status`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub submission_id: Uuid,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status query request body (`POST /analysis/status`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub submission_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_text() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Processing,
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
        }
        assert!("done".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AnalysisStatus::Pending.is_terminal());
        assert!(!AnalysisStatus::Processing.is_terminal());
        assert!(AnalysisStatus::Completed.is_terminal());
        assert!(AnalysisStatus::Failed.is_terminal());
    }

    #[test]
    fn test_snapshot_uses_camel_case_and_omits_empty_fields() {
        let snapshot = StatusSnapshot {
            submission_id: Uuid::nil(),
            status: AnalysisStatus::Completed,
            company_id: Some(Uuid::nil()),
            result_summary: Some(ResultSummary {
                company_name: "Acme".to_string(),
                overall_score: 4.2,
                section_count: 3,
            }),
            error: None,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("companyId").is_some());
        assert_eq!(json["resultSummary"]["overallScore"], 4.2);
        assert!(json.get("error").is_none());
    }
}
