//! Intake entrypoints: authenticated upload, public forms, inbound email
//!
//! Each entrypoint validates the deck, stores it, creates the submission at
//! `pending` and, unless the public form disables it, fires the analysis
//! trigger in the background. Rejections happen before anything is written.

use base64::Engine;
use deckflow_common::api::CallerIdentity;
use deckflow_common::Error;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::analysis_router::{AnalysisRouter, RouterError};
use super::blob_store::BlobStore;
use super::notifier::Notifier;
use crate::db::{forms, submissions};
use crate::models::{NewSubmission, Submission, SubmissionSource, EMAIL_SLUG, UPLOAD_SLUG};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("unknown form: {0}")]
    FormNotFound(String),

    #[error("form is closed: {0}")]
    FormInactive(String),

    #[error("email has no attachment")]
    MissingAttachment,

    #[error(transparent)]
    Store(#[from] Error),
}

/// Deck upload body shared by the upload and public form endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    pub document_name: String,
    pub document_base64: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `POST /forms/{slug}/submissions` body
#[derive(Debug, Clone, Deserialize)]
pub struct PublicFormSubmission {
    #[serde(flatten)]
    pub document: DocumentUpload,
    #[serde(default)]
    pub submitter_email: Option<String>,
}

/// Inbound email as posted by the mail provider
#[derive(Debug, Clone, Deserialize)]
pub struct EmailPayload {
    pub from: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_base64: String,
}

/// A stored submission and its background trigger, if one was fired
pub struct Accepted {
    pub submission: Submission,
    pub trigger: Option<JoinHandle<()>>,
}

pub struct IntakeService {
    db: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<Notifier>,
    router: AnalysisRouter,
    max_document_bytes: usize,
}

impl IntakeService {
    pub fn new(
        db: SqlitePool,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<Notifier>,
        router: AnalysisRouter,
        max_document_bytes: usize,
    ) -> Self {
        Self {
            db,
            blobs,
            notifier,
            router,
            max_document_bytes,
        }
    }

    /// Authenticated upload (`form_slug = upload`)
    pub async fn upload(
        &self,
        caller: &CallerIdentity,
        upload: DocumentUpload,
    ) -> Result<Accepted, IntakeError> {
        let document = self.decode_document(&upload.document_name, &upload.document_base64)?;
        let id = Uuid::new_v4();

        let new = NewSubmission {
            id,
            source: SubmissionSource::Upload,
            form_slug: UPLOAD_SLUG.to_string(),
            submitter: Some(caller.caller.clone()),
            company_name_hint: non_empty(upload.company_name),
            title: non_empty(upload.title),
            metadata: metadata_object(upload.metadata)?,
            document_path: NewSubmission::document_path_for(id, &upload.document_name),
            document_name: upload.document_name,
        };

        self.accept(new, &document, true).await
    }

    /// Public form submission; the form must exist and be active
    pub async fn public_form(
        &self,
        slug: &str,
        form: PublicFormSubmission,
    ) -> Result<Accepted, IntakeError> {
        let config = forms::load_form(&self.db, slug)
            .await?
            .ok_or_else(|| IntakeError::FormNotFound(slug.to_string()))?;
        if !config.is_active {
            return Err(IntakeError::FormInactive(slug.to_string()));
        }

        let upload = form.document;
        let document = self.decode_document(&upload.document_name, &upload.document_base64)?;
        let id = Uuid::new_v4();

        let new = NewSubmission {
            id,
            source: SubmissionSource::PublicForm,
            form_slug: slug.to_string(),
            submitter: non_empty(form.submitter_email),
            company_name_hint: non_empty(upload.company_name),
            title: non_empty(upload.title),
            metadata: metadata_object(upload.metadata)?,
            document_path: NewSubmission::document_path_for(id, &upload.document_name),
            document_name: upload.document_name,
        };

        self.accept(new, &document, config.auto_analyze).await
    }

    /// Inbound email with the deck attached (`form_slug = email-pitch`)
    pub async fn email(&self, email: EmailPayload) -> Result<Accepted, IntakeError> {
        let attachment = email.attachment.ok_or(IntakeError::MissingAttachment)?;
        let document = self.decode_document(&attachment.filename, &attachment.content_base64)?;
        let id = Uuid::new_v4();
        let subject = non_empty(email.subject);

        let new = NewSubmission {
            id,
            source: SubmissionSource::Email,
            form_slug: EMAIL_SLUG.to_string(),
            submitter: Some(email.from.trim().to_string()),
            company_name_hint: None,
            metadata: serde_json::json!({ "subject": subject }),
            title: subject,
            document_path: NewSubmission::document_path_for(id, &attachment.filename),
            document_name: attachment.filename,
        };

        self.accept(new, &document, true).await
    }

    fn decode_document(&self, name: &str, encoded: &str) -> Result<Vec<u8>, IntakeError> {
        if name.trim().is_empty() {
            return Err(IntakeError::InvalidDocument("document name is empty".to_string()));
        }

        // Base64 expands by 4/3; reject oversized payloads before decoding
        if encoded.len() / 4 * 3 > self.max_document_bytes + 3 {
            return Err(IntakeError::TooLarge {
                max: self.max_document_bytes,
            });
        }

        let cleaned: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| IntakeError::InvalidDocument(format!("not valid base64: {}", e)))?;

        if bytes.is_empty() {
            return Err(IntakeError::InvalidDocument("document is empty".to_string()));
        }
        if bytes.len() > self.max_document_bytes {
            return Err(IntakeError::TooLarge {
                max: self.max_document_bytes,
            });
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(IntakeError::InvalidDocument("document is not a PDF".to_string()));
        }

        Ok(bytes)
    }

    async fn accept(
        &self,
        new: NewSubmission,
        document: &[u8],
        auto_analyze: bool,
    ) -> Result<Accepted, IntakeError> {
        self.blobs.put(&new.document_path, document).await?;

        let submission = match submissions::create_submission(&self.db, &new).await {
            Ok(submission) => submission,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&new.document_path).await {
                    warn!(path = %new.document_path, error = %cleanup, "Failed to remove orphaned blob");
                }
                return Err(e.into());
            }
        };

        info!(
            submission_id = %submission.id,
            source = %submission.source,
            form_slug = %submission.form_slug,
            auto_analyze,
            "Submission received"
        );
        self.notifier.submission_created(&submission).await;

        let trigger = auto_analyze.then(|| self.spawn_trigger(submission.id));
        Ok(Accepted { submission, trigger })
    }

    fn spawn_trigger(&self, submission_id: Uuid) -> JoinHandle<()> {
        let router = self.router.clone();
        tokio::spawn(async move {
            match router.trigger(submission_id).await {
                Ok(dispatch) => {
                    if let Some(job) = dispatch.handle {
                        if let Err(e) = job.await {
                            error!(submission_id = %submission_id, error = %e, "Analysis task failed");
                        }
                    }
                }
                Err(RouterError::NotFound(id)) => {
                    warn!(submission_id = %id, "Submission disappeared before analysis trigger");
                }
                Err(e) => {
                    warn!(submission_id = %submission_id, error = %e, "Analysis trigger failed");
                }
            }
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn metadata_object(metadata: Option<serde_json::Value>) -> Result<serde_json::Value, IntakeError> {
    match metadata {
        None | Some(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Some(value @ serde_json::Value::Object(_)) => Ok(value),
        Some(_) => Err(IntakeError::InvalidDocument(
            "metadata must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_must_be_object() {
        assert_eq!(metadata_object(None).unwrap(), serde_json::json!({}));
        assert!(metadata_object(Some(serde_json::json!({"a": 1}))).is_ok());
        assert!(metadata_object(Some(serde_json::json!([1]))).is_err());
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty(Some("  Acme ".to_string())), Some("Acme".to_string()));
        assert_eq!(non_empty(Some("   ".to_string())), None);
    }
}
