//! Public form configuration

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::put,
    Json, Router,
};
use tracing::info;

use crate::db::forms;
use crate::models::{PublicForm, PublicFormInput};
use crate::{ApiError, ApiResult, AppState};

/// PUT /forms/{slug} (admin)
pub async fn upsert_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(input): Json<PublicFormInput>,
) -> ApiResult<Json<PublicForm>> {
    let identity = super::admin(&state, &headers)?;

    let valid_slug = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_slug {
        return Err(ApiError::BadRequest(format!(
            "Form slug must be lowercase letters, digits and dashes: {}",
            slug
        )));
    }
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Form title is empty".to_string()));
    }

    let form = forms::upsert_form(&state.db, &slug, &input).await?;
    info!(
        caller = %identity.caller,
        slug = %form.slug,
        auto_analyze = form.auto_analyze,
        is_active = form.is_active,
        "Public form configured"
    );
    Ok(Json(form))
}

pub fn form_routes() -> Router<AppState> {
    Router::new().route("/forms/:slug", put(upsert_form))
}
