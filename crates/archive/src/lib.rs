//! Pointer archives.
//!
//! A pointer archive is a tar archive in which the body of every regular file
//! has been replaced by a short pointer (for example a content hash or a
//! storage locator) computed by an external program. A PAX record
//! [`PTRTAR_SIZE_KEY`] in front of each such member keeps the size of the
//! original file, so that [`expand`] can rebuild a standard tar from the
//! pointers and check every expansion against it.
//!
//! - [`create`] walks the filesystem and writes a pointer archive, optionally
//!   reusing pointers from a [`ptrtar_cache`] cache.
//! - [`expand`] turns a pointer archive back into an ordinary tar.
//! - [`list_pointers`] copies the pointers out of a pointer archive.

mod counter;
mod create;
pub mod error;
mod expand;
mod list;
pub mod path;
mod transform;

pub use counter::{CountingReader, CountingWriter};
pub use create::{Summary, create};
pub use error::{Error, ErrorKind, Result};
pub use expand::{expand, identity};
pub use list::list_pointers;
pub use transform::{CommandTransform, Transform};

/// PAX record holding the real size, in decimal bytes, of the file a pointer
/// member stands for.
pub const PTRTAR_SIZE_KEY: &str = "PTRTAR.sz";
