//! Company read, enrichment and cascading delete

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::companies;
use crate::models::{CompanyDetail, CompanyEnrichment};
use crate::services::CacheGroup;
use crate::{ApiError, ApiResult, AppState};

/// GET /companies/{id}
pub async fn get_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<CompanyDetail>> {
    super::caller(&state, &headers)?;
    companies::load_company_detail(&state.db, company_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Company {}", company_id)))
}

/// PATCH /companies/{id}
///
/// Fills fields that are still empty and appends research notes; existing
/// values are never overwritten.
pub async fn enrich_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(company_id): Path<Uuid>,
    Json(enrichment): Json<CompanyEnrichment>,
) -> ApiResult<Json<CompanyDetail>> {
    let identity = super::caller(&state, &headers)?;
    if enrichment.is_empty() {
        return Err(ApiError::BadRequest("Nothing to enrich".to_string()));
    }

    if !companies::enrich_company(&state.db, company_id, &enrichment).await? {
        return Err(ApiError::NotFound(format!("Company {}", company_id)));
    }
    info!(caller = %identity.caller, company_id = %company_id, "Company enriched");

    companies::load_company_detail(&state.db, company_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Company {}", company_id)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCompanyResponse {
    pub company_id: Uuid,
    pub submissions: Vec<Uuid>,
    pub sections: usize,
    pub details: usize,
    pub research: usize,
}

/// DELETE /companies/{id} (admin)
///
/// Removes the company, its sections and research, and every submission
/// pointing at it. Stored decks are removed afterwards on a best-effort basis.
pub async fn delete_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<DeleteCompanyResponse>> {
    let identity = super::admin(&state, &headers)?;

    let report = companies::delete_company_cascade(&state.db, company_id, state.batch_size)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Company {}", company_id)))?;

    for path in &report.document_paths {
        if let Err(e) = state.blobs.delete(path).await {
            warn!(path = %path, error = %e, "Failed to remove stored deck");
        }
    }

    state.cache.invalidate_group(CacheGroup::Submissions).await;
    state.cache.invalidate_group(CacheGroup::PublicSubmissions).await;
    for submission_id in &report.submissions {
        state
            .cache
            .invalidate_group(CacheGroup::SubmissionStatus(*submission_id))
            .await;
    }

    info!(
        caller = %identity.caller,
        company_id = %company_id,
        submissions = report.submissions.len(),
        "Company deleted via API"
    );

    Ok(Json(DeleteCompanyResponse {
        company_id,
        submissions: report.submissions,
        sections: report.sections,
        details: report.details,
        research: report.research,
    }))
}

pub fn company_routes() -> Router<AppState> {
    Router::new().route(
        "/companies/:id",
        get(get_company).patch(enrich_company).delete(delete_company),
    )
}
