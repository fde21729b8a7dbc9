//! HTTP API integration tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use deckflow_ai::models::Routine;
use deckflow_ai::services::BlobStore;
use deckflow_common::AnalysisStatus;
use helpers::{body_json, harness, pdf_base64, result, Harness, Script, ADMIN_TOKEN, REVIEWER_TOKEN};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(h: &Harness, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    h.app().oneshot(request).await.unwrap()
}

fn upload_body() -> Value {
    json!({
        "document_name": "deck.pdf",
        "document_base64": pdf_base64(),
        "company_name": "Uploaded Co",
    })
}

async fn put_form(h: &Harness, slug: &str, auto_analyze: bool, is_active: bool) -> Response {
    send(
        h,
        Method::PUT,
        &format!("/forms/{}", slug),
        Some(ADMIN_TOKEN),
        Some(json!({
            "title": "Demo Day",
            "auto_analyze": auto_analyze,
            "is_active": is_active,
        })),
    )
    .await
}

fn parse_id(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness().await;

    let response = send(&h, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "deckflow-ai");
    assert!(body["version"].is_string());
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_health_degrades_after_failed_job() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    h.run_to_terminal(submission.id, Script::Fail("boom".to_string()))
        .await;

    let body = body_json(send(&h, Method::GET, "/health", None, None).await).await;
    assert_eq!(body["status"], "degraded");
    assert!(body["last_error"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_upload_requires_token() {
    let h = harness().await;

    let response = send(&h, Method::POST, "/submissions/upload", None, Some(upload_body())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);

    let response = send(
        &h,
        Method::POST,
        "/submissions/upload",
        Some("tok-unknown"),
        Some(upload_body()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_is_stored_and_analyzed() {
    let h = harness().await;

    let response = send(
        &h,
        Method::POST,
        "/submissions/upload",
        Some(REVIEWER_TOKEN),
        Some(upload_body()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let id = parse_id(&body);

    let done = h.wait_terminal(id).await;
    assert_eq!(done.analysis_status, AnalysisStatus::Completed);
    assert_eq!(done.form_slug, "upload");
    assert_eq!(done.submitter.as_deref(), Some("reviewer"));
    assert_eq!(done.company_name_hint.as_deref(), Some("Uploaded Co"));
    assert_eq!(h.blobs.get(&done.document_path).await.unwrap(), helpers::pdf_bytes());
    assert_eq!(h.extractor.calls(), vec![(Routine::PitchDeck, "deck.pdf".to_string())]);
}

#[tokio::test]
async fn test_upload_rejects_bad_documents() {
    let h = harness().await;

    let mut bad_base64 = upload_body();
    bad_base64["document_base64"] = json!("not base64 !!!");
    let response = send(&h, Method::POST, "/submissions/upload", Some(REVIEWER_TOKEN), Some(bad_base64)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut not_pdf = upload_body();
    not_pdf["document_base64"] = json!(base64_of(b"PK\x03\x04 zip archive"));
    let response = send(&h, Method::POST, "/submissions/upload", Some(REVIEWER_TOKEN), Some(not_pdf)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("invalid document"));

    let response = send(
        &h,
        Method::POST,
        "/submissions/upload",
        Some(REVIEWER_TOKEN),
        Some(json!({ "document_name": "deck.pdf" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(h.extractor.calls().is_empty());
}

fn base64_of(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_public_form_lifecycle() {
    let h = harness().await;

    let response = send(&h, Method::POST, "/forms/demo-day/submissions", None, Some(upload_body())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = put_form(&h, "demo-day", false, true).await;
    assert_eq!(response.status(), StatusCode::OK);
    let form = body_json(response).await;
    assert_eq!(form["slug"], "demo-day");
    assert_eq!(form["auto_analyze"], false);

    let mut body = upload_body();
    body["submitter_email"] = json!("founder@example.com");
    let response = send(&h, Method::POST, "/forms/demo-day/submissions", None, Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = parse_id(&body_json(response).await);

    let stored = h.load(id).await;
    assert_eq!(stored.analysis_status, AnalysisStatus::Pending);
    assert_eq!(stored.submitter.as_deref(), Some("founder@example.com"));
    assert!(h.extractor.calls().is_empty());

    put_form(&h, "demo-day", true, false).await;
    let response = send(&h, Method::POST, "/forms/demo-day/submissions", None, Some(upload_body())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_form_auto_analyze_routes_by_slug() {
    let h = harness().await;
    put_form(&h, "eureka-sample", true, true).await;

    let response = send(&h, Method::POST, "/forms/eureka-sample/submissions", None, Some(upload_body())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = parse_id(&body_json(response).await);

    assert_eq!(h.wait_terminal(id).await.analysis_status, AnalysisStatus::Completed);
    assert_eq!(h.extractor.calls()[0].0, Routine::EurekaForm);
}

#[tokio::test]
async fn test_form_configuration_is_admin_only() {
    let h = harness().await;

    let body = json!({ "title": "Demo Day" });
    let response = send(&h, Method::PUT, "/forms/demo-day", Some(REVIEWER_TOKEN), Some(body.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&h, Method::PUT, "/forms/Demo_Day", Some(ADMIN_TOKEN), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &h,
        Method::PUT,
        "/forms/demo-day",
        Some(ADMIN_TOKEN),
        Some(json!({ "title": "  " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_intake() {
    let h = harness().await;

    let response = send(
        &h,
        Method::POST,
        "/webhooks/email",
        None,
        Some(json!({ "from": "founder@example.com", "subject": "Our deck" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "email has no attachment");

    let response = send(
        &h,
        Method::POST,
        "/webhooks/email",
        None,
        Some(json!({
            "from": " founder@example.com ",
            "subject": "Our deck",
            "attachment": { "filename": "pitch.pdf", "content_base64": pdf_base64() },
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = parse_id(&body_json(response).await);

    let done = h.wait_terminal(id).await;
    assert_eq!(done.analysis_status, AnalysisStatus::Completed);
    assert_eq!(done.form_slug, "email-pitch");
    assert_eq!(done.submitter.as_deref(), Some("founder@example.com"));
    assert_eq!(done.title.as_deref(), Some("Our deck"));
    assert_eq!(h.extractor.calls(), vec![(Routine::EmailPitch, "pitch.pdf".to_string())]);
}

#[tokio::test]
async fn test_trigger_endpoint() {
    let h = harness().await;

    let response = send(
        &h,
        Method::POST,
        "/analysis/trigger",
        None,
        Some(json!({ "submissionId": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let response = send(&h, Method::POST, "/analysis/trigger", None, Some(json!({ "id": 1 }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let submission = h.seed_submission("barc-sample").await;
    let response = send(
        &h,
        Method::POST,
        "/analysis/trigger",
        None,
        Some(json!({ "submissionId": submission.id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["submissionId"], submission.id.to_string());
    assert_eq!(body["analysisFunction"], "analyze-barc-form");
    assert_eq!(body["result"]["dispatched"], true);

    h.wait_terminal(submission.id).await;

    // Repeat trigger acknowledges without a new job
    let response = send(
        &h,
        Method::POST,
        "/analysis/trigger",
        None,
        Some(json!({ "submissionId": submission.id })),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["dispatched"], false);
    assert_eq!(h.extractor.calls().len(), 1);
}

#[tokio::test]
async fn test_status_endpoints_follow_transitions() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    let uri = format!("/submissions/{}/status", submission.id);

    let response = send(&h, Method::GET, &format!("/submissions/{}/status", Uuid::new_v4()), None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(send(&h, Method::GET, &uri, None, None).await).await;
    assert_eq!(body["status"], "pending");
    assert!(body.get("companyId").is_none());

    let done = h
        .run_to_terminal(submission.id, Script::Respond(result("Status Co", 4.5, None)))
        .await;

    let body = body_json(send(&h, Method::GET, &uri, None, None).await).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["companyId"], done.company_id.unwrap().to_string());
    assert_eq!(body["resultSummary"]["companyName"], "Status Co");
    assert_eq!(body["resultSummary"]["sectionCount"], 2);

    let response = send(
        &h,
        Method::POST,
        "/analysis/status",
        None,
        Some(json!({ "submissionId": submission.id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, body);
}

#[tokio::test]
async fn test_rerun_endpoints_require_admin() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    h.run_to_terminal(submission.id, Script::Fail("flaky".to_string()))
        .await;

    let response = send(&h, Method::POST, "/analysis/rerun", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&h, Method::POST, "/analysis/rerun", Some(REVIEWER_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let response = send(
        &h,
        Method::POST,
        "/analysis/rerun",
        Some(ADMIN_TOKEN),
        Some(json!({ "family": "slides" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&h, Method::POST, "/analysis/rerun", Some(ADMIN_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "processed": 1, "failed": 0, "total": 1 }));

    assert_eq!(h.wait_terminal(submission.id).await.analysis_status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn test_single_rerun_endpoint() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    h.run_to_terminal(submission.id, Script::Fail("flaky".to_string()))
        .await;
    let uri = format!("/submissions/{}/rerun", submission.id);

    let response = send(&h, Method::POST, &uri, Some(REVIEWER_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&h, Method::POST, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["dispatched"], true);

    let done = h.wait_terminal(submission.id).await;
    assert_eq!(done.analysis_status, AnalysisStatus::Completed);
    assert!(done.analysis_error.is_none());

    let response = send(
        &h,
        Method::POST,
        &format!("/submissions/{}/rerun", Uuid::new_v4()),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_company_read_and_enrich() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    let done = h
        .run_to_terminal(submission.id, Script::Respond(result("Enrich Co", 3.9, None)))
        .await;
    let uri = format!("/companies/{}", done.company_id.unwrap());

    let response = send(&h, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&h, Method::GET, &uri, Some(REVIEWER_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let company = body_json(response).await;
    assert_eq!(company["name"], "Enrich Co");
    assert_eq!(company["sections"].as_array().unwrap().len(), 2);
    assert_eq!(company["sections"][0]["section_type"], "team");
    assert!(company["website"].is_null());

    let response = send(&h, Method::PATCH, &uri, Some(REVIEWER_TOKEN), Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &h,
        Method::PATCH,
        &uri,
        Some(REVIEWER_TOKEN),
        Some(json!({
            "website": "https://enrich.example",
            "research": [{ "topic": "competitors", "content": "Two incumbents" }],
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let company = body_json(response).await;
    assert_eq!(company["website"], "https://enrich.example");
    assert_eq!(company["research"].as_array().unwrap().len(), 1);

    // Filled fields are kept; research accumulates
    let response = send(
        &h,
        Method::PATCH,
        &uri,
        Some(REVIEWER_TOKEN),
        Some(json!({
            "website": "https://other.example",
            "industry": "Robotics",
            "research": [{ "topic": "market", "content": "Growing" }],
        })),
    )
    .await;
    let company = body_json(response).await;
    assert_eq!(company["website"], "https://enrich.example");
    assert_eq!(company["industry"], "Robotics");
    assert_eq!(company["research"].as_array().unwrap().len(), 2);

    let response = send(
        &h,
        Method::PATCH,
        &format!("/companies/{}", Uuid::new_v4()),
        Some(REVIEWER_TOKEN),
        Some(json!({ "stage": "Seed" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_company_delete_cascades() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    let done = h
        .run_to_terminal(submission.id, Script::Respond(result("Doomed Co", 2.5, None)))
        .await;
    let company_id = done.company_id.unwrap();
    let uri = format!("/companies/{}", company_id);

    // Warm the status cache so the delete has to invalidate it
    let status_uri = format!("/submissions/{}/status", submission.id);
    assert_eq!(send(&h, Method::GET, &status_uri, None, None).await.status(), StatusCode::OK);

    let response = send(&h, Method::DELETE, &uri, Some(REVIEWER_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&h, Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["companyId"], company_id.to_string());
    assert_eq!(report["submissions"], json!([submission.id.to_string()]));
    assert_eq!(report["sections"], 2);
    assert_eq!(report["details"], 3);

    assert!(h.blobs.get(&done.document_path).await.is_err());
    assert_eq!(
        send(&h, Method::GET, &uri, Some(REVIEWER_TOKEN), None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(&h, Method::GET, &status_uri, None, None).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = send(&h, Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submission_lists_are_filtered_and_fresh() {
    let h = harness().await;

    let response = send(&h, Method::GET, "/submissions", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let first = send(&h, Method::POST, "/submissions/upload", Some(REVIEWER_TOKEN), Some(upload_body())).await;
    let first_id = parse_id(&body_json(first).await);
    h.wait_terminal(first_id).await;

    let list = body_json(send(&h, Method::GET, "/submissions", Some(REVIEWER_TOKEN), None).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["analysis_status"], "completed");

    // A new submission must show up despite the cached list
    put_form(&h, "demo-day", false, true).await;
    let second = send(&h, Method::POST, "/forms/demo-day/submissions", None, Some(upload_body())).await;
    let second_id = parse_id(&body_json(second).await);

    let list = body_json(send(&h, Method::GET, "/submissions", Some(REVIEWER_TOKEN), None).await).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let pending = body_json(
        send(&h, Method::GET, "/submissions?status=pending", Some(REVIEWER_TOKEN), None).await,
    )
    .await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["id"], second_id.to_string());

    let form_list = body_json(
        send(&h, Method::GET, "/forms/demo-day/submissions", Some(REVIEWER_TOKEN), None).await,
    )
    .await;
    assert_eq!(form_list.as_array().unwrap().len(), 1);
    assert_eq!(form_list[0]["source"], "public_form");

    let uploads = body_json(
        send(&h, Method::GET, "/submissions?source=upload", Some(REVIEWER_TOKEN), None).await,
    )
    .await;
    assert_eq!(uploads.as_array().unwrap().len(), 1);
    assert_eq!(uploads[0]["id"], first_id.to_string());
}
