//! Path handling for archive member names and traversal bookkeeping.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;

/// Turns a path as given on the command line into the name it gets inside
/// the archive.
///
/// Archive members are always relative: leading `/` and `.` components are
/// dropped, and `..` is resolved against the preceding components. A `..`
/// with nothing left to resolve against is dropped too, as GNU tar strips a
/// leading `../`, so `../data` is archived as `data`. Only a Windows path
/// prefix fails, with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// The result may be empty (for `.` or `/`); such a root contributes its
/// children but no entry of its own.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ptrtar_archive::path::archive_name;
/// assert_eq!(archive_name("/srv/data/").unwrap(), Path::new("srv/data"));
/// assert_eq!(archive_name("./docs/./a.txt").unwrap(), Path::new("docs/a.txt"));
/// assert_eq!(archive_name("docs/../notes").unwrap(), Path::new("notes"));
/// assert_eq!(archive_name(".").unwrap(), Path::new(""));
/// assert_eq!(archive_name("../outside").unwrap(), Path::new("outside"));
/// ```
pub fn archive_name(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => components.push(s),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                components.pop();
            },
        }
    }
    Ok(components.into_iter().collect())
}

/// Absolute, lexically cleaned form of `path`, used to compare traversal
/// items with exclusions and as the cache key.
///
/// Symlinks are not resolved, so `/srv/link/..` becomes `/srv`.
pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let joined = std::path::absolute(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                cleaned.pop();
            },
            Component::CurDir => {},
            other => cleaned.push(other),
        }
    }
    Ok(cleaned)
}
