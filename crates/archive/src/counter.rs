//! Stream decorators.
//!
//! The counting wrappers forward every call unchanged to the wrapped stream
//! and keep a running total of the bytes that actually went through.

use std::io::{self, Read, Result, Write};

/// Counts the bytes read through it.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}
impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes read so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}
impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Counts the bytes written through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}
impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes accepted by the wrapped writer so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

/// Forwards writes until [`abort`](Self::abort) is called and refuses them
/// afterwards.
///
/// A `tar::Builder` writes the end-of-archive blocks when it is dropped; an
/// archive that failed half way must not end in a trailer that readers take
/// as a clean end.
#[derive(Debug)]
pub(crate) struct AbortableWriter<W> {
    inner: W,
    aborted: bool,
}
impl<W> AbortableWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, aborted: false }
    }

    pub(crate) fn abort(&mut self) {
        self.aborted = true;
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}
impl<W: Write> Write for AbortableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.aborted {
            return Err(io::Error::other("archive aborted"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
