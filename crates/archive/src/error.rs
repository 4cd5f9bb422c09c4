//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use ptrtar_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use std::path::PathBuf;
use std::process::ExitStatus;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A filesystem operation (stat, open, read, readlink, directory listing)
    /// failed for the given path.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Reading or writing an archive stream failed.
    #[display("archive stream I/O error")]
    Stream,
    /// The path can't be represented inside an archive.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The input archive is malformed.
    #[display("invalid archive data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// An expansion produced a different number of bytes than the pointer
    /// entry declared.
    #[display("file {name}, was {actual} bytes but header expected {expected} bytes")]
    SizeMismatch { name: String, expected: u64, actual: u64 },
    /// The external program could not be started.
    #[display("could not run {_0}")]
    Spawn(#[error(not(source))] String),
    /// The external program ran but reported failure.
    #[display("{program} failed: {status}")]
    TransformFailed { program: String, status: ExitStatus },
    /// An in-process transform returned an error.
    #[display("transform failed")]
    Transform,
    /// Pointer cache lookup or update failed.
    #[display("pointer cache error: {_0}")]
    Cache(CacheErrorKind),
}

impl ErrorKind {
    /// Convert a cache error into an archive error, preserving the cache
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Cache(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cache(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}
