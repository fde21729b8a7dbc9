//! Submission records
//!
//! One row per inbound pitch deck. `analysis_*` fields and `company_id` are
//! written only by the status updater.

use chrono::{DateTime, Utc};
use deckflow_common::AnalysisStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Form slug assigned to authenticated uploads
pub const UPLOAD_SLUG: &str = "upload";
/// Form slug assigned to decks received by email
pub const EMAIL_SLUG: &str = "email-pitch";

/// Intake entrypoint that produced a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSource {
    Upload,
    PublicForm,
    Email,
}

impl SubmissionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionSource::Upload => "upload",
            SubmissionSource::PublicForm => "public_form",
            SubmissionSource::Email => "email",
        }
    }
}

impl fmt::Display for SubmissionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionSource {
    type Err = deckflow_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(SubmissionSource::Upload),
            "public_form" => Ok(SubmissionSource::PublicForm),
            "email" => Ok(SubmissionSource::Email),
            other => Err(deckflow_common::Error::InvalidInput(format!(
                "Unknown submission source: {}",
                other
            ))),
        }
    }
}

/// Stored submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub source: SubmissionSource,
    pub form_slug: String,
    pub submitter: Option<String>,
    pub company_name_hint: Option<String>,
    pub title: Option<String>,
    pub metadata: serde_json::Value,
    pub document_name: String,
    pub document_path: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_result: Option<serde_json::Value>,
    pub analysis_error: Option<String>,
    pub company_id: Option<Uuid>,
    /// Bumped on every entry into `processing`
    pub analysis_generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Fields supplied by an intake entrypoint
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub id: Uuid,
    pub source: SubmissionSource,
    pub form_slug: String,
    pub submitter: Option<String>,
    pub company_name_hint: Option<String>,
    pub title: Option<String>,
    pub metadata: serde_json::Value,
    pub document_name: String,
    pub document_path: String,
}

impl NewSubmission {
    /// Blob path for a submission's deck
    pub fn document_path_for(id: Uuid, document_name: &str) -> String {
        format!("submissions/{}/{}", id, sanitize_file_name(document_name))
    }
}

/// Status write requested of the submission store
///
/// `error` is only persisted with `Failed`, `company_id` only with
/// `Completed`; other combinations are cleared on write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: AnalysisStatus,
    pub error: Option<String>,
    pub company_id: Option<Uuid>,
}

impl StatusUpdate {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            error: Some(error.into()),
            company_id: None,
        }
    }
}

/// Filter for submission list queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilter {
    pub source: Option<SubmissionSource>,
    pub slug: Option<String>,
    pub status: Option<AnalysisStatus>,
    pub limit: Option<u32>,
}

impl SubmissionFilter {
    /// Stable cache key for this filter
    pub fn cache_key(&self) -> String {
        format!(
            "source={};slug={};status={};limit={}",
            self.source.map(|s| s.as_str()).unwrap_or(""),
            self.slug.as_deref().unwrap_or(""),
            self.status.map(|s| s.as_str()).unwrap_or(""),
            self.limit.map(|l| l.to_string()).unwrap_or_default()
        )
    }
}

/// Keep only characters that are safe in a blob path segment
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "document.pdf".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name_strips_path_components() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("My Deck (v2).pdf"), "My_Deck__v2_.pdf");
        assert_eq!(sanitize_file_name("..."), "document.pdf");
    }

    #[test]
    fn test_document_path_is_scoped_to_submission() {
        let id = Uuid::nil();
        assert_eq!(
            NewSubmission::document_path_for(id, "deck.pdf"),
            "submissions/00000000-0000-0000-0000-000000000000/deck.pdf"
        );
    }

    #[test]
    fn test_filter_cache_key_distinguishes_filters() {
        let all = SubmissionFilter::default();
        let eureka = SubmissionFilter {
            slug: Some("eureka".to_string()),
            ..Default::default()
        };
        assert_ne!(all.cache_key(), eureka.cache_key());
    }
}
