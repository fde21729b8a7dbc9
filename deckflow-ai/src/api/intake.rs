//! Intake endpoints
//!
//! All three answer `{success, id?, error?}`. Rejections use 400 for bad
//! documents, 401 for missing credentials and 404 for unknown forms.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::services::{Accepted, DocumentUpload, EmailPayload, IntakeError, PublicFormSubmission};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn accepted(accepted: Accepted) -> Response {
    // The trigger runs on its own; the caller only gets the id
    drop(accepted.trigger);
    (
        StatusCode::CREATED,
        Json(IntakeResponse {
            success: true,
            id: Some(accepted.submission.id),
            error: None,
        }),
    )
        .into_response()
}

fn rejected(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(IntakeResponse {
            success: false,
            id: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn intake_error(err: IntakeError) -> Response {
    let status = match &err {
        IntakeError::InvalidDocument(_)
        | IntakeError::TooLarge { .. }
        | IntakeError::MissingAttachment => StatusCode::BAD_REQUEST,
        IntakeError::FormNotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::FormInactive(_) => StatusCode::FORBIDDEN,
        IntakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, "Intake failed");
        return rejected(status, "submission could not be stored".to_string());
    }
    warn!(error = %err, "Intake rejected");
    rejected(status, err.to_string())
}

fn bad_body(rejection: JsonRejection) -> Response {
    rejected(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// POST /submissions/upload
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DocumentUpload>, JsonRejection>,
) -> Response {
    let identity = match super::caller(&state, &headers) {
        Ok(identity) => identity,
        Err(e) => return rejected(StatusCode::UNAUTHORIZED, e.to_string()),
    };
    let Json(upload) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state.intake.upload(&identity, upload).await {
        Ok(result) => accepted(result),
        Err(e) => intake_error(e),
    }
}

/// POST /forms/{slug}/submissions
pub async fn public_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<PublicFormSubmission>, JsonRejection>,
) -> Response {
    let Json(form) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state.intake.public_form(&slug, form).await {
        Ok(result) => accepted(result),
        Err(e) => intake_error(e),
    }
}

/// POST /webhooks/email
pub async fn email(
    State(state): State<AppState>,
    body: Result<Json<EmailPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    match state.intake.email(payload).await {
        Ok(result) => accepted(result),
        Err(e) => intake_error(e),
    }
}

pub fn intake_routes() -> Router<AppState> {
    Router::new()
        .route("/submissions/upload", post(upload))
        .route("/forms/:slug/submissions", post(public_form))
        .route("/webhooks/email", post(email))
}
