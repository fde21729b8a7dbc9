//! Shared HTTP API functionality
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Shared request/response types
//!
//! The service wraps these with axum extractors and handlers.

pub mod auth;
pub mod types;

pub use auth::{parse_bearer, require_admin, resolve_caller, ApiAuthError, CallerIdentity};
pub use types::{AnalysisStatus, ResultSummary, StatusQuery, StatusSnapshot};
