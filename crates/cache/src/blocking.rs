//! A synchronous handle to the pointer cache.
//!
//! The archive engines are plain `std::io` pipelines; this wraps an async
//! [`PointerCache`] together with a small current-thread runtime to drive it.

use crate::cache::{Options, PointerCache};
use crate::error::{ErrorKind, Result};
use crate::identity::FileIdentity;
use exn::{OptionExt, ResultExt};
use std::path::Path;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingPointerCache {
    runtime: Runtime,
    inner: Option<PointerCache>,
}

impl BlockingPointerCache {
    /// See [`PointerCache::open_with`].
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().or_raise(|| ErrorKind::Runtime)?;
        let inner = runtime.block_on(PointerCache::open_with(path, options))?;
        Ok(Self { runtime, inner: Some(inner) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().map(PointerCache::path)
    }

    /// See [`PointerCache::has_ptr`].
    pub fn has_ptr(&mut self, identity: &FileIdentity) -> Result<Option<Vec<u8>>> {
        let runtime = &self.runtime;
        let cache = self.inner.as_mut().ok_or_raise(|| ErrorKind::Closed)?;
        runtime.block_on(cache.has_ptr(identity))
    }

    /// See [`PointerCache::add_ptr`].
    pub fn add_ptr(&mut self, identity: &FileIdentity, pointer: &[u8]) -> Result<()> {
        let runtime = &self.runtime;
        let cache = self.inner.as_mut().ok_or_raise(|| ErrorKind::Closed)?;
        runtime.block_on(cache.add_ptr(identity, pointer))
    }

    /// See [`PointerCache::len`].
    pub fn len(&mut self) -> Result<u64> {
        let runtime = &self.runtime;
        let cache = self.inner.as_mut().ok_or_raise(|| ErrorKind::Closed)?;
        runtime.block_on(cache.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// See [`PointerCache::close`].
    pub fn close(mut self) -> Result<()> {
        let cache = self.inner.take().ok_or_raise(|| ErrorKind::Closed)?;
        self.runtime.block_on(cache.close())
    }
}

impl Drop for BlockingPointerCache {
    // Returning pooled connections needs a runtime, so an unclosed cache is
    // rolled back here rather than left to the async handle's own drop.
    fn drop(&mut self) {
        if let Some(cache) = self.inner.take()
            && let Err(err) = self.runtime.block_on(cache.rollback())
        {
            tracing::warn!(error = %err, "failed to roll back unclosed cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let identity = FileIdentity::new("/srv/file", 1, 2, 3);

        let mut cache = BlockingPointerCache::open(&path, &Options::default()).unwrap();
        assert_eq!(cache.path(), Some(path.as_path()));
        assert!(cache.is_empty().unwrap());
        cache.add_ptr(&identity, b"pointer").unwrap();
        assert_eq!(cache.has_ptr(&identity).unwrap(), Some(b"pointer".to_vec()));
        cache.close().unwrap();

        let mut cache = BlockingPointerCache::open(&path, &Options::default()).unwrap();
        assert_eq!(cache.has_ptr(&identity).unwrap(), Some(b"pointer".to_vec()));
    }

    #[test]
    fn test_drop_discards_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let identity = FileIdentity::new("/srv/file", 1, 2, 3);

        let mut cache = BlockingPointerCache::open(&path, &Options::default()).unwrap();
        cache.add_ptr(&identity, b"pointer").unwrap();
        drop(cache);

        let mut cache = BlockingPointerCache::open(&path, &Options::default()).unwrap();
        assert_eq!(cache.has_ptr(&identity).unwrap(), None);
        cache.close().unwrap();
    }
}
