//! Transactions that survive lock contention.
//!
//! Several processes may share one cache file. SQLite serializes writers with
//! file locks, so a transaction can fail with `SQLITE_BUSY`/`SQLITE_LOCKED`
//! at any statement (including `COMMIT`) while another process holds the
//! lock. [`resilient`] runs a unit of work inside a transaction and, when the
//! failure is contention, throws the whole attempt away and runs it again.

use crate::error::{ErrorKind, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::instrument;

const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// How [`resilient`] behaves when the store reports contention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause inserted before every attempt after the second one. The first
    /// retry happens immediately.
    pub delay: Duration,
    /// Total number of attempts before giving up with
    /// [`ErrorKind::Contention`]. `None` retries until the lock is released.
    pub max_attempts: Option<u32>,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self { delay: DEFAULT_DELAY, max_attempts: None }
    }
}
impl RetryPolicy {
    pub fn bounded(max_attempts: u32) -> Self {
        Self { max_attempts: Some(max_attempts), ..Self::default() }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Run `work` inside a transaction, committing if it succeeds and rolling
/// back if it fails or panics. Contention errors restart the whole unit of
/// work in a fresh transaction according to `policy`; any other error is
/// returned straight away.
///
/// The unit of work receives the transaction's connection. It may be called
/// several times, so it must not assume a previous attempt left anything
/// behind.
#[instrument(level = "trace", skip_all)]
pub async fn resilient<T, F>(pool: &SqlitePool, policy: &RetryPolicy, mut work: F) -> Result<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let err = match attempt(pool, &mut work).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };
        if policy.exhausted(attempts) {
            tracing::warn!(attempts, "giving up on contended cache transaction");
            return Err(err);
        }
        if attempts > 1 {
            tracing::warn!(attempts, delay = ?policy.delay, "cache is busy; waiting before next attempt");
            tokio::time::sleep(policy.delay).await;
        } else {
            tracing::debug!("cache is busy; retrying transaction");
        }
    }
}

/// One transaction, committed or rolled back exactly once on every exit path.
async fn attempt<T, F>(pool: &SqlitePool, work: &mut F) -> Result<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut tx = pool.begin().await.map_err(ErrorKind::database)?;
    let outcome = AssertUnwindSafe(work(&mut *tx)).catch_unwind().await;
    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await.map_err(ErrorKind::database)?;
            Ok(value)
        },
        Ok(Err(err)) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback after failed unit of work also failed");
            }
            Err(err)
        },
        Err(payload) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback after panicked unit of work failed");
            }
            panic::resume_unwind(payload)
        },
    }
}
