//! Caller identity resolution from bearer tokens
//!
//! Tokens are configured in the `[auth]` section of `deckflow.toml` as a
//! token -> caller map. Only pure functions live here; the service wraps them
//! in axum extractors.

use std::collections::HashMap;
use std::fmt;

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No `Authorization` header on the request
    MissingCredentials,

    /// Header present but not of the form `Bearer <token>`
    MalformedHeader,

    /// Token is not configured
    UnknownToken,

    /// Caller is known but lacks the admin role
    Forbidden { caller: String },
}

impl fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiAuthError::MissingCredentials => write!(f, "Missing Authorization header"),
            ApiAuthError::MalformedHeader => {
                write!(f, "Authorization header must use the Bearer scheme")
            }
            ApiAuthError::UnknownToken => write!(f, "Invalid API token"),
            ApiAuthError::Forbidden { caller } => {
                write!(f, "Caller '{}' is not allowed to perform this action", caller)
            }
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub caller: String,
    pub is_admin: bool,
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: Option<&str>) -> Result<&str, ApiAuthError> {
    let value = header.ok_or(ApiAuthError::MissingCredentials)?.trim();
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(ApiAuthError::MalformedHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiAuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiAuthError::MalformedHeader);
    }
    Ok(token)
}

/// Resolve the caller behind an `Authorization` header
///
/// `tokens` maps API token -> caller name; `admins` lists callers allowed to
/// run admin operations (reruns, form configuration).
pub fn resolve_caller(
    tokens: &HashMap<String, String>,
    admins: &[String],
    header: Option<&str>,
) -> Result<CallerIdentity, ApiAuthError> {
    let token = parse_bearer(header)?;
    let caller = tokens.get(token).ok_or(ApiAuthError::UnknownToken)?;

    Ok(CallerIdentity {
        caller: caller.clone(),
        is_admin: admins.iter().any(|a| a == caller),
    })
}

/// Like [`resolve_caller`] but requires the admin role
pub fn require_admin(
    tokens: &HashMap<String, String>,
    admins: &[String],
    header: Option<&str>,
) -> Result<CallerIdentity, ApiAuthError> {
    let identity = resolve_caller(tokens, admins, header)?;
    if !identity.is_admin {
        return Err(ApiAuthError::Forbidden {
            caller: identity.caller,
        });
    }
    Ok(identity)
}
