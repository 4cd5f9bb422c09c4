//! The pointer cache.
//!
//! Maps a [`FileIdentity`] to the pointer bytes that were computed for it the
//! last time the file was archived. All reads and writes made through an open
//! [`PointerCache`] happen inside a single transaction that is only committed
//! by [`PointerCache::close`]; until then nothing is visible to other
//! processes, and if the handle is dropped (or the process dies) the writes
//! are discarded as a whole.

use crate::db;
use crate::error::{ErrorKind, Result};
use crate::identity::FileIdentity;
use crate::retry::{self, RetryPolicy};
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Schema version written to, and expected in, the `Meta` table.
pub const CACHE_VERSION: i64 = 0;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Tuning for opening a cache file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Retry behaviour of the bootstrap transaction.
    pub retry: RetryPolicy,
    /// How long SQLite waits on a lock before reporting the store busy.
    pub busy_timeout: Duration,
}
impl Default for Options {
    fn default() -> Self {
        Self { retry: RetryPolicy::default(), busy_timeout: DEFAULT_BUSY_TIMEOUT }
    }
}

/// An open cache file with its long-lived transaction.
#[derive(Debug)]
pub struct PointerCache {
    path: PathBuf,
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl PointerCache {
    /// Open (or create) the cache file at `path` with default [`Options`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &Options::default()).await
    }

    /// Open (or create) the cache file at `path`.
    ///
    /// Fails with [`ErrorKind::IncompatibleVersion`] if the file was created
    /// by a different schema version; the file is left untouched in that case.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_with(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pool = db::connect(&path, options.busy_timeout).await?;
        match Self::start(&path, &pool, &options.retry).await {
            Ok(tx) => {
                tracing::debug!("cache opened");
                Ok(Self { path, pool, tx: Some(tx) })
            },
            Err(err) => {
                pool.close().await;
                Err(err)
            },
        }
    }

    async fn start(path: &Path, pool: &SqlitePool, policy: &RetryPolicy) -> Result<Transaction<'static, Sqlite>> {
        retry::resilient(pool, policy, |conn| Box::pin(bootstrap(conn, path.to_path_buf()))).await?;
        pool.begin().await.map_err(ErrorKind::database)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        let tx = self.tx.as_mut().ok_or_raise(|| ErrorKind::Closed)?;
        Ok(&mut **tx)
    }

    /// Look up the pointer stored for exactly this identity.
    ///
    /// A record for the same path with any other field differing is a miss.
    #[instrument(level = "trace", skip_all, fields(path = %identity.path.display()))]
    pub async fn has_ptr(&mut self, identity: &FileIdentity) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(include_str!("../queries/get_pointer.sql"))
            .bind(identity.path_bytes())
            .bind(identity.mod_time_nanos)
            .bind(identity.change_time_nanos)
            .bind(identity.size)
            .fetch_optional(self.connection()?)
            .await
            .map_err(ErrorKind::database)?;
        tracing::trace!(hit = row.is_some(), "cache lookup");
        Ok(row.map(|(pointer,)| pointer))
    }

    /// Store `pointer` for `identity`, replacing whatever was stored for the
    /// same path before.
    #[instrument(level = "trace", skip_all, fields(path = %identity.path.display(), size = pointer.len()))]
    pub async fn add_ptr(&mut self, identity: &FileIdentity, pointer: &[u8]) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_pointer.sql"))
            .bind(identity.path_bytes())
            .bind(identity.mod_time_nanos)
            .bind(identity.change_time_nanos)
            .bind(identity.size)
            .bind(pointer)
            .execute(self.connection()?)
            .await
            .map_err(ErrorKind::database)?;
        Ok(())
    }

    /// Number of cached records visible through this handle.
    pub async fn len(&mut self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(include_str!("../queries/count_pointers.sql"))
            .fetch_one(self.connection()?)
            .await
            .map_err(ErrorKind::database)?;
        u64::try_from(row.0).or_raise(|| ErrorKind::InvalidData("record count"))
    }

    pub async fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Commit everything written since [`open`](Self::open) and close the
    /// file.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn close(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_raise(|| ErrorKind::Closed)?;
        let committed = tx.commit().await.map_err(ErrorKind::database);
        if committed.is_ok() {
            // Let SQLite update query planner statistics
            _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        }
        self.pool.close().await;
        tracing::debug!(committed = committed.is_ok(), "cache closed");
        committed
    }

    /// Discard everything written since [`open`](Self::open) and close the
    /// file.
    pub async fn rollback(mut self) -> Result<()> {
        let rolled_back = match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(ErrorKind::database),
            None => Ok(()),
        };
        self.pool.close().await;
        rolled_back
    }
}

/// Check the schema version and create the tables if they don't exist yet.
async fn bootstrap(conn: &mut SqliteConnection, path: PathBuf) -> Result<()> {
    let meta: Option<(String,)> = sqlx::query_as(include_str!("../queries/find_meta_table.sql"))
        .fetch_optional(&mut *conn)
        .await
        .map_err(ErrorKind::database)?;
    if meta.is_some() {
        // Read as an SQL literal so a value of any storage class compares
        // (and reports) without a decode error.
        let version: Option<(String,)> = sqlx::query_as(include_str!("../queries/get_version.sql"))
            .fetch_optional(&mut *conn)
            .await
            .map_err(ErrorKind::database)?;
        if let Some((found,)) = version
            && found != CACHE_VERSION.to_string()
        {
            exn::bail!(ErrorKind::IncompatibleVersion { path, found, expected: CACHE_VERSION });
        }
    }
    sqlx::query(include_str!("../queries/create_files.sql"))
        .execute(&mut *conn)
        .await
        .map_err(ErrorKind::database)?;
    sqlx::query(include_str!("../queries/create_meta.sql"))
        .execute(&mut *conn)
        .await
        .map_err(ErrorKind::database)?;
    sqlx::query(include_str!("../queries/insert_version.sql"))
        .bind(CACHE_VERSION)
        .execute(&mut *conn)
        .await
        .map_err(ErrorKind::database)?;
    Ok(())
}
