//! HTTP API handlers for deckflow-ai
//!
//! Intake, analysis control, read models, maintenance, SSE and health.

pub mod analysis;
pub mod companies;
pub mod forms;
pub mod health;
pub mod intake;
pub mod sse;
pub mod submissions;

pub use analysis::analysis_routes;
pub use companies::company_routes;
pub use forms::form_routes;
pub use health::health_routes;
pub use intake::intake_routes;
pub use sse::event_routes;
pub use submissions::submission_routes;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use deckflow_common::api::{self as auth, ApiAuthError, CallerIdentity};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

use crate::services::{CacheGroup, QueryCache};
use crate::{ApiError, ApiResult, AppState};

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Resolve the bearer caller of a request
pub(crate) fn caller(state: &AppState, headers: &HeaderMap) -> Result<CallerIdentity, ApiAuthError> {
    auth::resolve_caller(&state.auth.tokens, &state.auth.admins, authorization(headers))
}

/// Resolve the bearer caller and require the admin role
pub(crate) fn admin(state: &AppState, headers: &HeaderMap) -> Result<CallerIdentity, ApiAuthError> {
    auth::require_admin(&state.auth.tokens, &state.auth.admins, authorization(headers))
}

/// Serve a read through the query cache
///
/// Misses run `load`; `None` results are not cached.
pub(crate) async fn cached_read<T, F, Fut>(
    cache: &QueryCache,
    group: CacheGroup,
    key: &str,
    load: F,
) -> ApiResult<Option<Value>>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = deckflow_common::Result<Option<T>>>,
{
    if let Some(hit) = cache.get(group, key).await {
        return Ok(Some(hit));
    }

    let epoch = cache.epoch(group).await;
    let Some(loaded) = load().await? else {
        return Ok(None);
    };

    let value = serde_json::to_value(&loaded)
        .map_err(|e| ApiError::Internal(format!("Failed to encode response: {}", e)))?;
    cache.put(group, key, value.clone(), epoch).await;
    Ok(Some(value))
}
