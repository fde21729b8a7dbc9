//! Shared fixtures for deckflow-ai integration tests
//!
//! Each harness gets its own in-memory database, a temporary blob store and
//! a scripted extraction service.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use base64::Engine;
use deckflow_ai::models::{
    ExtractedSection, ExtractionRequest, ExtractionResult, NewSubmission, Routine, ScoreScale,
    Submission, SubmissionSource,
};
use deckflow_ai::services::{BlobStore, ExtractionError, ExtractionService, FsBlobStore};
use deckflow_ai::{build_router, AppState};
use deckflow_common::config::TomlConfig;
use deckflow_common::events::EventBus;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const REVIEWER_TOKEN: &str = "tok-reviewer";
pub const ADMIN_TOKEN: &str = "tok-admin";

/// One scripted answer of the fake extraction service
pub enum Script {
    Respond(ExtractionResult),
    Fail(String),
    /// Never answers; the router's deadline has to fire
    Hang,
    /// Panics inside the extraction call
    Panic,
}

/// Extraction service answering from a queue of scripts
///
/// When the queue is empty every call gets the fallback result.
pub struct ScriptedExtractor {
    scripts: Mutex<VecDeque<Script>>,
    fallback: ExtractionResult,
    calls: Mutex<Vec<(Routine, String)>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: result("Acme Robotics", 4.0, Some(ScoreScale::FivePoint)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// `(routine, document_name)` of every call so far
    pub fn calls(&self) -> Vec<(Routine, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.routine, request.document_name.clone()));
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            None => Ok(self.fallback.clone()),
            Some(Script::Respond(result)) => Ok(result),
            Some(Script::Fail(message)) => Err(ExtractionError::Api(500, message)),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExtractionError::Empty)
            }
            Some(Script::Panic) => panic!("extraction backend crashed"),
        }
    }
}

pub struct Harness {
    pub state: AppState,
    pub extractor: Arc<ScriptedExtractor>,
    pub blobs: Arc<FsBlobStore>,
    _blob_dir: tempfile::TempDir,
}

/// Configuration with zero pipeline delays and two API callers
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.pipeline.consistency_delay_ms = 0;
    config.pipeline.rerun_delay_ms = 0;
    config.extraction.timeout_secs = 1;
    config
        .auth
        .tokens
        .insert(REVIEWER_TOKEN.to_string(), "reviewer".to_string());
    config
        .auth
        .tokens
        .insert(ADMIN_TOKEN.to_string(), "admin".to_string());
    config.auth.admins = vec!["admin".to_string()];
    config
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

pub async fn harness_with(customize: impl FnOnce(&mut TomlConfig)) -> Harness {
    let mut config = test_config();
    customize(&mut config);

    let pool = deckflow_common::db::init_memory_database().await.unwrap();
    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = Arc::new(FsBlobStore::new(blob_dir.path()));
    let extractor = Arc::new(ScriptedExtractor::new());

    let state = AppState::new(
        pool,
        EventBus::new(100),
        &config,
        extractor.clone(),
        blobs.clone(),
    )
    .unwrap();

    Harness {
        state,
        extractor,
        blobs,
        _blob_dir: blob_dir,
    }
}

impl Harness {
    pub fn db(&self) -> &SqlitePool {
        &self.state.db
    }

    pub fn app(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Store a deck and a `pending` submission for `slug`
    pub async fn seed_submission(&self, slug: &str) -> Submission {
        let id = Uuid::new_v4();
        let new = NewSubmission {
            id,
            source: SubmissionSource::PublicForm,
            form_slug: slug.to_string(),
            submitter: Some("founder@example.com".to_string()),
            company_name_hint: Some("Hinted Co".to_string()),
            title: None,
            metadata: serde_json::json!({}),
            document_name: "deck.pdf".to_string(),
            document_path: NewSubmission::document_path_for(id, "deck.pdf"),
        };
        self.blobs.put(&new.document_path, &pdf_bytes()).await.unwrap();
        deckflow_ai::db::submissions::create_submission(self.db(), &new)
            .await
            .unwrap()
    }

    pub async fn load(&self, id: Uuid) -> Submission {
        deckflow_ai::db::submissions::load_submission(self.db(), id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Wait until background work leaves the submission terminal
    pub async fn wait_terminal(&self, id: Uuid) -> Submission {
        for _ in 0..200 {
            let submission = self.load(id).await;
            if submission.analysis_status.is_terminal() {
                return submission;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("submission {} never reached a terminal status", id);
    }

    /// Force a submission into a terminal state through the normal pipeline
    pub async fn run_to_terminal(&self, id: Uuid, script: Script) -> Submission {
        self.extractor.push(script);
        let dispatch = self.state.router.trigger(id).await.unwrap();
        dispatch.handle.unwrap().await.unwrap();
        let submission = self.load(id).await;
        assert!(submission.analysis_status.is_terminal());
        submission
    }
}

pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj <<>> endobj\n%%EOF\n".to_vec()
}

pub fn pdf_base64() -> String {
    base64::engine::general_purpose::STANDARD.encode(pdf_bytes())
}

pub fn result(name: &str, score: f64, scale: Option<ScoreScale>) -> ExtractionResult {
    let section_score = match scale {
        Some(ScoreScale::Percent) => 70.0,
        _ => 3.5,
    };
    ExtractionResult {
        company_name: Some(name.to_string()),
        overall_score: score,
        score_scale: scale,
        assessment_points: vec!["Clear go-to-market".to_string()],
        sections: vec![
            ExtractedSection {
                section_type: "team".to_string(),
                title: "Team".to_string(),
                score: section_score,
                description: "Second-time founders".to_string(),
                strengths: vec!["Domain expertise".to_string()],
                weaknesses: vec!["No CFO".to_string()],
            },
            ExtractedSection {
                section_type: "market".to_string(),
                title: "Market".to_string(),
                score: section_score,
                description: "Large addressable market".to_string(),
                strengths: vec![],
                weaknesses: vec!["Crowded space".to_string()],
            },
        ],
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
