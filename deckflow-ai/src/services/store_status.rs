//! In-process poll transport for the status watcher

use async_trait::async_trait;
use deckflow_common::api::StatusSnapshot;
use deckflow_common::watcher::StatusSource;
use deckflow_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::submissions;

/// Reads status snapshots straight from the submission store
#[derive(Clone)]
pub struct StoreStatusSource {
    db: SqlitePool,
}

impl StoreStatusSource {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatusSource for StoreStatusSource {
    async fn fetch_status(&self, submission_id: Uuid) -> Result<Option<StatusSnapshot>> {
        submissions::load_status_snapshot(&self.db, submission_id).await
    }
}
