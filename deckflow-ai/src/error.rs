//! Error types for deckflow-ai HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deckflow_common::api::ApiAuthError;
use serde_json::json;
use thiserror::Error;

use crate::services::RouterError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or unknown credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// deckflow-common error
    #[error("Common error: {0}")]
    Common(#[from] deckflow_common::Error),
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        match err {
            ApiAuthError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::NotFound(id) => ApiError::NotFound(format!("Submission {}", id)),
            RouterError::Store(e) => ApiError::Common(e),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Common(deckflow_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(deckflow_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Common(deckflow_common::Error::NotFound(_)) => "NOT_FOUND",
            ApiError::Common(deckflow_common::Error::InvalidInput(_)) => "BAD_REQUEST",
            ApiError::Common(_) => "COMMON_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Common(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
