//! Utility modules for deckflow-ai

pub mod db_retry;
pub mod pool_monitor;

pub use db_retry::{retry_on_lock, MAX_LOCK_WAIT_MS};
pub use pool_monitor::{begin_monitored, MonitoredTransaction};

/// Longest error text stored in `analysis_error`
pub const MAX_ERROR_CHARS: usize = 500;

/// Make an error message safe to store and display
///
/// Control characters become spaces, runs of whitespace collapse, and the
/// result is cut to [`MAX_ERROR_CHARS`] characters.
pub fn sanitize_error(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= MAX_ERROR_CHARS {
        collapsed
    } else {
        collapsed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
