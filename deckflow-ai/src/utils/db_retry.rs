//! Database retry logic
//!
//! Exponential backoff for transient SQLite lock errors. Every write in the
//! submission and company stores goes through [`retry_on_lock`].

use deckflow_common::{Error, Result};
use std::time::{Duration, Instant};

/// Default upper bound on total retry time for store writes
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Retry a database operation with exponential backoff until `max_wait_ms`
/// elapses.
///
/// Only "database is locked" errors are retried; any other error is returned
/// immediately. Backoff starts at 10ms and doubles up to 1000ms.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g. "submission status update")
/// * `max_wait_ms` - Maximum total time to keep retrying
/// * `operation` - Async closure that performs the database operation
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let msg = db_err.to_string();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}
