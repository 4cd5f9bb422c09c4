//! File identity: the cache key.

use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A specific observed state of a file.
///
/// Two identities are equal only if all four fields are equal. Any change to
/// content, metadata or the clock produces a different identity, which makes
/// the cached pointer for the old identity unreachable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Modification time, nanoseconds since the Unix epoch.
    pub mod_time_nanos: i64,
    /// Inode change time, nanoseconds since the Unix epoch.
    pub change_time_nanos: i64,
    /// Size in bytes as reported by `stat`.
    pub size: i64,
}
impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>, mod_time_nanos: i64, change_time_nanos: i64, size: i64) -> Self {
        Self { path: path.into(), mod_time_nanos, change_time_nanos, size }
    }

    /// Identity of the file at `path` as described by `metadata`.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self {
            path: path.into(),
            mod_time_nanos: nanos(metadata.mtime(), metadata.mtime_nsec()),
            change_time_nanos: nanos(metadata.ctime(), metadata.ctime_nsec()),
            // A file can't be larger than i64::MAX bytes on any filesystem we
            // can stat, but saturate rather than wrap just in case.
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
        }
    }

    /// Raw bytes of the path, as stored in the `FullPath` column.
    ///
    /// Paths are stored as blobs so non-UTF-8 file names can be cached
    /// without lossy conversion (which could make two paths collide).
    pub(crate) fn path_bytes(&self) -> &[u8] {
        path_bytes(&self.path)
    }
}

/// Nanoseconds since the epoch, saturating outside the years 1678 to 2262.
fn nanos(secs: i64, nsec: i64) -> i64 {
    let nanos = i128::from(secs) * i128::from(NANOS_PER_SECOND) + i128::from(nsec);
    nanos.clamp(i64::MIN.into(), i64::MAX.into()) as i64
}

pub(crate) fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}
