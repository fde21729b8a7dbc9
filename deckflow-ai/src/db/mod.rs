//! Database access for deckflow-ai
//!
//! Schema creation lives in `deckflow_common::db`; this module holds the
//! row-level operations for submissions, companies and public forms.

pub mod companies;
pub mod forms;
pub mod submissions;

use chrono::{DateTime, Utc};
use deckflow_common::{Error, Result};
use uuid::Uuid;

/// `?, ?, ?` for an `IN (...)` list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in column {}: {} ({})", column, value, e)))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            Error::Internal(format!(
                "Invalid timestamp in column {}: {} ({})",
                column, value, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_timestamp_round_trip() {
        let text = now_text();
        assert!(parse_timestamp("created_at", &text).is_ok());
        assert!(parse_timestamp("created_at", "yesterday").is_err());
    }
}
