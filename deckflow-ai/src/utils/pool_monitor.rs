//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log how long a connection waited and how
//! long it was held. Used for company materialization, which holds the single
//! writer connection across several statements.

use deckflow_common::{Error, Result};
use sqlx::{Sqlite, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Commit and log how long the connection was held
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;
        self.log_release("commit");
        Ok(())
    }

    /// Roll back and log how long the connection was held
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback().await?;
        self.log_release("rollback");
        Ok(())
    }

    /// Inner transaction, usable as an executor (`&mut **tx.inner_mut()?`)
    pub fn inner_mut(&mut self) -> Result<&mut Transaction<'c, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already finished", self.caller)))
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already finished", self.caller)))
    }

    fn log_release(&self, how: &str) {
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                how,
                "Long transaction held the database connection"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back an unfinished transaction on drop
            self.log_release("drop");
        }
    }
}

/// Begin a transaction with connection timing logs
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
