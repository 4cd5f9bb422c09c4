//! Building a pointer archive from a set of filesystem roots.
//!
//! Every regular file is replaced by the pointer bytes the pointer operation
//! produces for it (or the cache remembers for it), and preceded by a PAX
//! record carrying the file's real size under [`PTRTAR_SIZE_KEY`]. Everything
//! else is archived as it is.

use crate::PTRTAR_SIZE_KEY;
use crate::counter::{AbortableWriter, CountingReader};
use crate::error::{ErrorKind, Result};
use crate::path::{absolute, archive_name};
use crate::transform::Transform;
use exn::ResultExt;
use ptrtar_cache::{BlockingPointerCache, FileIdentity};
use std::collections::HashSet;
use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header, HeaderMode};
use tracing::instrument;

/// Counters describing a finished [`create`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub entries: u64,
    pub files: u64,
    pub cache_hits: u64,
    pub excluded: u64,
}

/// A path waiting to be archived.
#[derive(Debug)]
struct WorkItem {
    /// Absolute, cleaned path on disk.
    absolute: PathBuf,
    /// Member name inside the archive.
    name: PathBuf,
    metadata: Metadata,
}

/// Write a pointer archive of `roots` to `out` and return the writer.
///
/// Roots are archived in the order given, each followed depth-first by its
/// contents (siblings in byte order of their names). Roots given more than
/// once are archived once. A root that is a symlink is followed; symlinks
/// found inside directories are archived as links. Any path in `excludes`
/// (compared in absolute, cleaned form) is skipped together with everything
/// below it.
///
/// With a cache, a file whose identity is already cached reuses the cached
/// pointer without being read; every other file is read once through
/// `pointer_op` and its pointer is added to the cache.
#[instrument(skip_all)]
pub fn create<W, T>(
    roots: impl IntoIterator<Item = impl AsRef<Path>>,
    excludes: impl IntoIterator<Item = impl AsRef<Path>>,
    pointer_op: &mut T,
    cache: Option<&mut BlockingPointerCache>,
    out: W,
) -> Result<(W, Summary)>
where
    W: Write,
    T: Transform + ?Sized,
{
    let excludes = excludes.into_iter().map(absolute).collect::<Result<HashSet<_>>>()?;
    let mut archiver = Archiver {
        builder: Builder::new(AbortableWriter::new(out)),
        excludes,
        pointer_op,
        cache,
        summary: Summary::default(),
    };
    if let Err(err) = archiver.run(roots) {
        archiver.builder.get_mut().abort();
        return Err(err);
    }
    let Archiver { builder, summary, .. } = archiver;
    let out = builder.into_inner().or_raise(|| ErrorKind::Stream)?.into_inner();
    tracing::debug!(?summary, "archive written");
    Ok((out, summary))
}

struct Archiver<'a, W: Write, T: ?Sized> {
    builder: Builder<AbortableWriter<W>>,
    excludes: HashSet<PathBuf>,
    pointer_op: &'a mut T,
    cache: Option<&'a mut BlockingPointerCache>,
    summary: Summary,
}

impl<W: Write, T: Transform + ?Sized> Archiver<'_, W, T> {
    fn run(&mut self, roots: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<()> {
        let mut stack = self.seed(roots)?;
        while let Some(item) = stack.pop() {
            self.append(item, &mut stack)?;
        }
        Ok(())
    }

    /// Stat the roots and stack them up so they come off in the given order.
    fn seed(&mut self, roots: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<Vec<WorkItem>> {
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        for root in roots {
            let root = root.as_ref();
            let absolute = absolute(root)?;
            if !seen.insert(absolute.clone()) {
                tracing::debug!(root = %root.display(), "skipping repeated root");
                continue;
            }
            if self.is_excluded(&absolute) {
                continue;
            }
            let metadata = fs::metadata(&absolute).or_raise(|| ErrorKind::Io(root.to_path_buf()))?;
            stack.push(WorkItem { absolute, name: archive_name(root)?, metadata });
        }
        stack.reverse();
        Ok(stack)
    }

    fn is_excluded(&mut self, absolute: &Path) -> bool {
        let excluded = self.excludes.contains(absolute);
        if excluded {
            self.summary.excluded += 1;
            tracing::debug!(path = %absolute.display(), "excluded");
        }
        excluded
    }

    #[instrument(level = "trace", skip_all, fields(name = %item.name.display()))]
    fn append(&mut self, item: WorkItem, stack: &mut Vec<WorkItem>) -> Result<()> {
        let file_type = item.metadata.file_type();
        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&item.metadata, HeaderMode::Complete);

        if file_type.is_file() {
            let (pointer, true_size) = self.pointer_for(&item)?;
            header.set_size(pointer.len() as u64);
            self.builder
                .append_pax_extensions([(PTRTAR_SIZE_KEY, true_size.to_string().as_bytes())])
                .or_raise(|| ErrorKind::Stream)?;
            self.builder.append_data(&mut header, &item.name, pointer.as_slice()).or_raise(|| ErrorKind::Stream)?;
            self.summary.files += 1;
        } else if file_type.is_dir() {
            // A root such as `.` has no name of its own, only its children
            // make it into the archive.
            if !item.name.as_os_str().is_empty() {
                header.set_size(0);
                self.builder.append_data(&mut header, &item.name, io::empty()).or_raise(|| ErrorKind::Stream)?;
            }
            self.push_children(&item, stack)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&item.absolute).or_raise(|| ErrorKind::Io(item.absolute.clone()))?;
            header.set_size(0);
            self.builder.append_link(&mut header, &item.name, &target).or_raise(|| ErrorKind::Stream)?;
        } else {
            // Fifos, sockets and device nodes: header only.
            header.set_size(0);
            self.builder.append_data(&mut header, &item.name, io::empty()).or_raise(|| ErrorKind::Stream)?;
        }
        tracing::debug!(name = %item.name.display(), kind = ?header.entry_type(), "archived");
        self.summary.entries += 1;
        Ok(())
    }

    /// Pointer bytes and true size for a regular file.
    fn pointer_for(&mut self, item: &WorkItem) -> Result<(Vec<u8>, u64)> {
        let identity = FileIdentity::from_metadata(&item.absolute, &item.metadata);
        if let Some(cache) = self.cache.as_deref_mut()
            && let Some(pointer) = cache.has_ptr(&identity).map_err(ErrorKind::cache)?
        {
            tracing::trace!("cache hit");
            self.summary.cache_hits += 1;
            return Ok((pointer, item.metadata.len()));
        }

        let file = File::open(&item.absolute).or_raise(|| ErrorKind::Io(item.absolute.clone()))?;
        let mut input = CountingReader::new(file);
        let mut pointer = Vec::new();
        self.pointer_op.apply(&mut input, &mut pointer)?;
        // The file may have changed since it was stat'ed; the bytes the
        // operation actually consumed are what an expansion will reproduce.
        let true_size = input.count();
        if let Some(cache) = self.cache.as_deref_mut() {
            cache.add_ptr(&identity, &pointer).map_err(ErrorKind::cache)?;
        }
        Ok((pointer, true_size))
    }

    /// Queue the entries of a directory so they come off the stack in name
    /// order, ahead of anything queued before.
    fn push_children(&mut self, item: &WorkItem, stack: &mut Vec<WorkItem>) -> Result<()> {
        let read_dir = || -> io::Result<Vec<(std::ffi::OsString, Metadata)>> {
            let mut children = Vec::new();
            for entry in fs::read_dir(&item.absolute)? {
                let entry = entry?;
                children.push((entry.file_name(), entry.metadata()?));
            }
            Ok(children)
        };
        let mut children = read_dir().or_raise(|| ErrorKind::Io(item.absolute.clone()))?;
        children.sort_by(|a, b| a.0.cmp(&b.0));
        for (file_name, metadata) in children.into_iter().rev() {
            let absolute = item.absolute.join(&file_name);
            if self.is_excluded(&absolute) {
                continue;
            }
            stack.push(WorkItem { name: item.name.join(&file_name), absolute, metadata });
        }
        Ok(())
    }
}
