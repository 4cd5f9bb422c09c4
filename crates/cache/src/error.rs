//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    /// The database file is locked or busy because another connection (most
    /// likely another process) is writing to it. The whole unit of work can be
    /// retried from the beginning.
    #[display("database is locked or busy")]
    Contention,
    /// The cache file was written by an incompatible version of this software.
    /// There is no migration path; the operator has to delete the file.
    #[display(
        "cache {} version {found} differs from your current software version {expected} \
         (it is safe to delete the old cache file manually)",
        path.display()
    )]
    IncompatibleVersion {
        path: PathBuf,
        /// The stored version as an SQL literal, e.g. `3` or `'v2'`.
        found: String,
        expected: i64,
    },
    /// The cache handle was already closed.
    #[display("cache is closed")]
    Closed,
    /// Serialization/deserialization error.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The async runtime backing the blocking cache could not be built.
    #[display("could not start cache runtime")]
    Runtime,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention)
    }

    /// Classify a database error, attaching it as the child of the returned
    /// error tree.
    ///
    /// SQLite reports contention as `SQLITE_BUSY` (5) or `SQLITE_LOCKED` (6);
    /// extended result codes carry the primary code in their lowest byte.
    #[track_caller]
    pub fn database(err: sqlx::Error) -> Error {
        let kind = if is_contention(&err) { Self::Contention } else { Self::Database };
        exn::Exn::new(err).raise(kind)
    }
}

const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

fn is_contention(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    db.code()
        .and_then(|code| code.parse::<i64>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}
