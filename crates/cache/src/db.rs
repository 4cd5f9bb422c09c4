//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

// The long-lived cache transaction pins a connection for the whole lifetime of
// the handle, and nothing else runs concurrently within one process.
const MAX_CONNECTIONS: u32 = 1;

/// Open a connection pool for the cache file at `path`, creating the file if
/// it doesn't exist yet.
pub(crate) async fn connect(path: &Path, busy_timeout: Duration) -> Result<SqlitePool> {
    let options = base_options(busy_timeout).filename(path).create_if_missing(true);
    pool(options).await
}

/// Connect to an in-memory database (useful for testing).
///
/// In-memory databases are destroyed when the connection closes; with a
/// single pooled connection every caller sees the same database.
#[cfg(test)]
pub(crate) async fn connect_in_memory() -> Result<SqlitePool> {
    pool(base_options(Duration::from_millis(100)).filename(":memory:")).await
}

async fn pool(options: SqliteConnectOptions) -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        // Apply the query-based PRAGMAs to every connection the pool opens,
        // not only to the first one.
        .after_connect(|conn, meta| Box::pin(async move { apply_pragmas(conn, meta).await }))
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(ErrorKind::database)
}

/// Base connection options shared between file and in-memory databases.
fn base_options(busy_timeout: Duration) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        // Rollback journal: the journal mode is persisted in the file header,
        // and opening a cache must never rewrite a file it then rejects.
        .journal_mode(SqliteJournalMode::Delete)
        // PRAGMA synchronous = NORMAL (balance between safety and speed)
        .synchronous(SqliteSynchronous::Normal)
        // How long SQLite's own busy handler waits before SQLITE_BUSY is
        // surfaced to the retry loop.
        .busy_timeout(busy_timeout)
}

/// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
    sqlx::query(
        r#"
            PRAGMA cache_size = -8192;
            PRAGMA temp_store = MEMORY;
        "#,
    )
    .execute(conn)
    .await?;
    Ok(())
}
