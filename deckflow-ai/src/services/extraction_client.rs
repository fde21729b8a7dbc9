//! Extraction service client
//!
//! The extraction service turns a deck into a scored evaluation. It is
//! reached through the [`ExtractionService`] trait so the pipeline can run
//! against a scripted implementation in tests.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ExtractionRequest, ExtractionResult};

const USER_AGENT: &str = concat!("deckflow-ai/", env!("CARGO_PKG_VERSION"));

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("malformed result: {0}")]
    Malformed(String),

    #[error("empty result")]
    Empty,
}

/// Scores a deck
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResult, ExtractionError>;
}

#[derive(Serialize)]
struct ExtractBody<'a> {
    routine: &'a str,
    model: &'a str,
    document_name: &'a str,
    document_base64: String,
    context: &'a serde_json::Value,
}

/// HTTP client for `POST {endpoint}/extract`
pub struct HttpExtractionClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpExtractionClient {
    /// `timeout_secs` bounds the HTTP exchange; the analysis router applies
    /// its own deadline on top.
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractionError> {
        let timeout_secs = timeout_secs.max(1);
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionClient {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let body = ExtractBody {
            routine: request.routine.function_name(),
            model: &self.model,
            document_name: &request.document_name,
            document_base64: base64::engine::general_purpose::STANDARD.encode(&request.document),
            context: &request.context,
        };

        tracing::debug!(
            routine = request.routine.function_name(),
            document_bytes = request.document.len(),
            "Calling extraction service"
        );

        let mut builder = self
            .http_client
            .post(format!("{}/extract", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExtractionError::Timeout(self.timeout_secs)
            } else {
                ExtractionError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExtractionError::Connection(e.to_string()))?;

        if !status.is_success() {
            return Err(ExtractionError::Api(status.as_u16(), text));
        }

        parse_result(&text)
    }
}

/// Parse an extraction answer, tolerating a Markdown code fence around it
pub fn parse_result(text: &str) -> Result<ExtractionResult, ExtractionError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    if value.is_null() || value.as_object().is_some_and(|o| o.is_empty()) {
        return Err(ExtractionError::Empty);
    }

    serde_json::from_value(value).map_err(|e| ExtractionError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"company_name":"Acme","overall_score":84,"assessment_points":["a"],"sections":[]}"#;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_result(BODY).unwrap();
        assert_eq!(result.company_name.as_deref(), Some("Acme"));
        assert_eq!(result.overall_score, 84.0);
        assert!(result.score_scale.is_none());
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```json\n{}\n```\n", BODY);
        assert_eq!(parse_result(&fenced).unwrap(), parse_result(BODY).unwrap());
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(matches!(parse_result("  "), Err(ExtractionError::Empty)));
        assert!(matches!(parse_result("{}"), Err(ExtractionError::Empty)));
        assert!(matches!(parse_result("null"), Err(ExtractionError::Empty)));
        assert!(matches!(
            parse_result("{\"company_name\": \"Acme\"}"),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(parse_result("not json"), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn test_timeout_message_names_timeout() {
        assert!(ExtractionError::Timeout(60).to_string().contains("timeout"));
    }

    #[test]
    fn test_client_creation() {
        let client = HttpExtractionClient::new("http://localhost:8787/", "m", None, 60).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8787");
    }
}
