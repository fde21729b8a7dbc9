//! Cached submission list queries

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::db::submissions;
use crate::models::SubmissionFilter;
use crate::services::CacheGroup;
use crate::{ApiResult, AppState};

async fn list(state: &AppState, group: CacheGroup, filter: SubmissionFilter) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let key = filter.cache_key();
    let rows = super::cached_read(&state.cache, group, &key, || async move {
        submissions::list_submissions(&db, &filter).await.map(Some)
    })
    .await?;

    Ok(Json(rows.unwrap_or_else(|| Value::Array(Vec::new()))))
}

/// GET /submissions?source=&slug=&status=&limit=
pub async fn list_submissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<SubmissionFilter>,
) -> ApiResult<Json<Value>> {
    super::caller(&state, &headers)?;
    list(&state, CacheGroup::Submissions, filter).await
}

/// GET /forms/{slug}/submissions?status=&limit=
pub async fn list_form_submissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(filter): Query<SubmissionFilter>,
) -> ApiResult<Json<Value>> {
    super::caller(&state, &headers)?;
    let filter = SubmissionFilter {
        slug: Some(slug),
        ..filter
    };
    list(&state, CacheGroup::PublicSubmissions, filter).await
}

pub fn submission_routes() -> Router<AppState> {
    Router::new()
        .route("/submissions", get(list_submissions))
        .route("/forms/:slug/submissions", get(list_form_submissions))
}
