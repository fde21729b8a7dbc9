//! Read-model cache for list and status queries
//!
//! Entries are grouped; invalidating a group drops all of its entries and
//! stamps it with the next value of a monotonic clock. A reader captures the
//! clock before querying the database and its `put` is ignored if the group
//! was invalidated meanwhile, so a slow read cannot re-insert data older than
//! the last invalidation.
//!
//! Per-submission groups are removed outright on invalidation. Their stamps
//! collapse into one floor, which makes the stale-`put` check conservative
//! for them. The number of per-submission groups held at once is capped.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Cap on per-submission groups held at once
const MAX_STATUS_GROUPS: usize = 4096;

/// Invalidation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheGroup {
    /// `GET /submissions`
    Submissions,
    /// `GET /forms/{slug}/submissions`
    PublicSubmissions,
    /// `GET /submissions/{id}/status`
    SubmissionStatus(Uuid),
}

impl CacheGroup {
    pub fn name(&self) -> String {
        match self {
            CacheGroup::Submissions => "submissions".to_string(),
            CacheGroup::PublicSubmissions => "public-submissions".to_string(),
            CacheGroup::SubmissionStatus(id) => format!("submission-status:{}", id),
        }
    }

    fn is_per_submission(&self) -> bool {
        matches!(self, CacheGroup::SubmissionStatus(_))
    }
}

#[derive(Default)]
struct GroupEntries {
    invalidated_at: u64,
    entries: HashMap<String, Value>,
}

#[derive(Default)]
struct CacheState {
    clock: u64,
    /// Latest invalidation of a per-submission group no longer in the map
    status_floor: u64,
    groups: HashMap<CacheGroup, GroupEntries>,
}

impl CacheState {
    fn invalidated_at(&self, group: CacheGroup) -> u64 {
        match self.groups.get(&group) {
            Some(entries) => entries.invalidated_at,
            None if group.is_per_submission() => self.status_floor,
            None => 0,
        }
    }

    fn status_group_count(&self) -> usize {
        self.groups.keys().filter(|g| g.is_per_submission()).count()
    }
}

#[derive(Default)]
pub struct QueryCache {
    state: RwLock<CacheState>,
    invalidations: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, group: CacheGroup, key: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.groups.get(&group)?.entries.get(key).cloned()
    }

    /// Epoch to pass to [`QueryCache::put`] for a read starting now
    pub async fn epoch(&self, _group: CacheGroup) -> u64 {
        self.state.read().await.clock
    }

    /// Store a value read at `epoch`; returns whether it was kept
    pub async fn put(&self, group: CacheGroup, key: &str, value: Value, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        let invalidated_at = state.invalidated_at(group);
        if invalidated_at > epoch {
            return false;
        }

        if group.is_per_submission()
            && !state.groups.contains_key(&group)
            && state.status_group_count() >= MAX_STATUS_GROUPS
        {
            // Dropped groups keep their stamps at or below the floor
            state.groups.retain(|g, _| !g.is_per_submission());
            tracing::debug!("Per-submission cache groups evicted");
        }

        state
            .groups
            .entry(group)
            .or_insert_with(|| GroupEntries {
                invalidated_at,
                entries: HashMap::new(),
            })
            .entries
            .insert(key.to_string(), value);
        true
    }

    /// Drop every entry of a group. Idempotent.
    pub async fn invalidate_group(&self, group: CacheGroup) {
        let mut state = self.state.write().await;
        state.clock += 1;
        let stamp = state.clock;

        if group.is_per_submission() {
            state.groups.remove(&group);
            state.status_floor = stamp;
        } else {
            let entry = state.groups.entry(group).or_default();
            entry.entries.clear();
            entry.invalidated_at = stamp;
        }

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(group = %group.name(), "Cache group invalidated");
    }

    /// Invalidate everything a status change of `submission_id` affects
    pub async fn invalidate_submission(&self, submission_id: Uuid) {
        for group in [
            CacheGroup::Submissions,
            CacheGroup::PublicSubmissions,
            CacheGroup::SubmissionStatus(submission_id),
        ] {
            self.invalidate_group(group).await;
        }
    }

    /// Total group invalidations since startup
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}
