//! Analysis control endpoints: trigger, status and reruns

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use deckflow_common::api::StatusQuery;
use deckflow_common::events::RerunSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::submissions;
use crate::models::Routine;
use crate::services::{CacheGroup, DispatchAck, RouterError};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub submission_id: Uuid,
}

/// `{success, submissionId, analysisFunction, result}` or `{success:false, error}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DispatchAck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerResponse {
    fn ok(ack: DispatchAck) -> Self {
        Self {
            success: true,
            submission_id: Some(ack.submission_id),
            analysis_function: Some(ack.routine.function_name().to_string()),
            result: Some(ack),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            submission_id: None,
            analysis_function: None,
            result: None,
            error: Some(error),
        }
    }
}

fn trigger_error(err: RouterError) -> Response {
    let status = match &err {
        RouterError::NotFound(_) => StatusCode::NOT_FOUND,
        RouterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, "Analysis trigger rejected");
    (status, Json(TriggerResponse::failed(err.to_string()))).into_response()
}

/// POST /analysis/trigger
///
/// Idempotent; the job runs in the background and the response only
/// acknowledges the dispatch.
pub async fn trigger(
    State(state): State<AppState>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TriggerResponse::failed(rejection.body_text())),
            )
                .into_response()
        }
    };

    match state.router.trigger(request.submission_id).await {
        Ok(dispatch) => Json(TriggerResponse::ok(dispatch.ack)).into_response(),
        Err(e) => trigger_error(e),
    }
}

async fn status_response(state: &AppState, submission_id: Uuid) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let snapshot = super::cached_read(
        &state.cache,
        CacheGroup::SubmissionStatus(submission_id),
        "status",
        || async move { submissions::load_status_snapshot(&db, submission_id).await },
    )
    .await?;

    snapshot
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Submission {}", submission_id)))
}

/// GET /submissions/{id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    status_response(&state, submission_id).await
}

/// POST /analysis/status
pub async fn post_status(
    State(state): State<AppState>,
    Json(query): Json<StatusQuery>,
) -> ApiResult<Json<Value>> {
    status_response(&state, query.submission_id).await
}

#[derive(Debug, Default, Deserialize)]
pub struct RerunRequest {
    /// Routine family (`pitch_deck`, `eureka_form`, `barc_form`, `email_pitch`); all when absent
    #[serde(default)]
    pub family: Option<String>,
}

/// POST /analysis/rerun (admin)
pub async fn rerun_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RerunRequest>>,
) -> ApiResult<Json<RerunSummary>> {
    let identity = super::admin(&state, &headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let family = match request.family.as_deref() {
        None | Some("") => None,
        Some(name) => Some(
            name.parse::<Routine>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown routine family: {}", name)))?,
        ),
    };

    info!(caller = %identity.caller, family = family.map(|f| f.family()), "Bulk rerun requested");
    let summary = state.rerun.rerun_all(family).await?;
    Ok(Json(summary))
}

/// POST /submissions/{id}/rerun (admin)
pub async fn rerun_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<Uuid>,
) -> ApiResult<Json<TriggerResponse>> {
    let identity = super::admin(&state, &headers)?;
    info!(caller = %identity.caller, submission_id = %submission_id, "Rerun requested");

    let (ack, _handle) = state.rerun.rerun_one(submission_id).await?;
    Ok(Json(TriggerResponse::ok(ack)))
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/trigger", post(trigger))
        .route("/analysis/status", post(post_status))
        .route("/analysis/rerun", post(rerun_all))
        .route("/submissions/:id/status", get(get_status))
        .route("/submissions/:id/rerun", post(rerun_one))
}
