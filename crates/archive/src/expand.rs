//! Turning a pointer archive back into an ordinary tar.
//!
//! The input is walked header by header without tar-rs's own interpretation
//! of extension records, so that everything which isn't a pointer can be
//! copied through byte for byte. A pointer is recognised by the
//! [`PTRTAR_SIZE_KEY`] record in the PAX header in front of it; the record is
//! dropped, the member's size is set to the declared true size and its body is
//! whatever the expansion operation produces for the pointer.

use crate::PTRTAR_SIZE_KEY;
use crate::counter::{AbortableWriter, CountingWriter};
use crate::error::{ErrorKind, Result};
use crate::transform::Transform;
use exn::{OptionExt, ResultExt};
use std::io::{self, Read, Write};
use tar::{Archive, Builder, EntryType, PaxExtensions};
use tracing::instrument;

const BLOCK_SIZE: u64 = 512;

/// Metadata collected from extension headers, applying to the next member.
#[derive(Debug, Default)]
struct Pending {
    true_size: Option<u64>,
    /// Member name from a PAX `path` record or a GNU long name, if any.
    name: Option<String>,
}

/// Expand the pointer archive read from `input` into a standard tar written
/// to `out`, and return the writer.
///
/// Fails with [`SizeMismatch`](ErrorKind::SizeMismatch) as soon as an
/// expansion produces a different number of bytes than its member declared;
/// nothing after that member is written.
#[instrument(skip_all)]
pub fn expand<R, W, T>(input: R, expand_op: &mut T, out: W) -> Result<W>
where
    R: Read,
    W: Write,
    T: Transform + ?Sized,
{
    let mut builder = Builder::new(AbortableWriter::new(out));
    let expanded = match expand_entries(input, &mut builder, expand_op) {
        Ok(expanded) => expanded,
        Err(err) => {
            builder.get_mut().abort();
            return Err(err);
        },
    };
    let out = builder.into_inner().or_raise(|| ErrorKind::Stream)?.into_inner();
    tracing::debug!(expanded, "archive expanded");
    Ok(out)
}

/// Copy or expand every member, returning the number of pointers expanded.
fn expand_entries<R, W, T>(input: R, builder: &mut Builder<W>, expand_op: &mut T) -> Result<u64>
where
    R: Read,
    W: Write,
    T: Transform + ?Sized,
{
    let mut archive = Archive::new(input);
    let mut pending = Pending::default();
    let mut expanded: u64 = 0;

    let entries = archive.entries().or_raise(|| ErrorKind::Stream)?.raw(true);
    for entry in entries {
        let mut entry = entry.or_raise(|| ErrorKind::InvalidData("unreadable header".to_string()))?;
        let header = entry.header().clone();
        match header.entry_type() {
            EntryType::XHeader => {
                let mut body = Vec::new();
                entry.read_to_end(&mut body).or_raise(|| ErrorKind::Stream)?;
                let records = parse_pax(&body)?;
                if let Some(name) = record(&records, "path") {
                    pending.name = Some(String::from_utf8_lossy(name).into_owned());
                }
                match record(&records, PTRTAR_SIZE_KEY) {
                    Some(value) => {
                        pending.true_size = Some(parse_size(value, pending.name.as_deref())?);
                        // A pointer's size is ours to set; drop any size
                        // override along with the marker.
                        let kept = records.iter().filter(|(k, _)| *k != PTRTAR_SIZE_KEY && *k != "size");
                        let kept: Vec<_> = kept.map(|(k, v)| (*k, *v)).collect();
                        if !kept.is_empty() {
                            builder.append_pax_extensions(kept).or_raise(|| ErrorKind::Stream)?;
                        }
                    },
                    None => builder.append(&header, body.as_slice()).or_raise(|| ErrorKind::Stream)?,
                }
            },
            EntryType::GNULongName => {
                let mut body = Vec::new();
                entry.read_to_end(&mut body).or_raise(|| ErrorKind::Stream)?;
                let name = body.strip_suffix(b"\0").unwrap_or(&body);
                pending.name = Some(String::from_utf8_lossy(name).into_owned());
                builder.append(&header, body.as_slice()).or_raise(|| ErrorKind::Stream)?;
            },
            EntryType::GNULongLink | EntryType::XGlobalHeader => {
                builder.append(&header, &mut entry).or_raise(|| ErrorKind::Stream)?;
            },
            _ => {
                let member = std::mem::take(&mut pending);
                match member.true_size {
                    Some(true_size) => {
                        let name = member.name.unwrap_or_else(|| String::from_utf8_lossy(&header.path_bytes()).into_owned());
                        expand_member(builder, header, &mut entry, expand_op, true_size, &name)?;
                        expanded += 1;
                    },
                    None => builder.append(&header, &mut entry).or_raise(|| ErrorKind::Stream)?,
                }
            },
        }
    }
    Ok(expanded)
}

/// Write one pointer member in expanded form: its header with the true size,
/// the expansion of its pointer, and block padding.
#[instrument(level = "trace", skip(builder, header, entry, expand_op))]
fn expand_member<W, T>(
    builder: &mut Builder<W>,
    mut header: tar::Header,
    entry: &mut impl Read,
    expand_op: &mut T,
    true_size: u64,
    name: &str,
) -> Result<()>
where
    W: Write,
    T: Transform + ?Sized,
{
    // Pointers are small; holding one in memory keeps the transform input
    // independent of the archive reader.
    let mut pointer = Vec::new();
    entry.read_to_end(&mut pointer).or_raise(|| ErrorKind::Stream)?;

    header.set_size(true_size);
    header.set_cksum();
    let out = builder.get_mut();
    out.write_all(header.as_bytes()).or_raise(|| ErrorKind::Stream)?;

    let mut counter = CountingWriter::new(&mut *out);
    let mut input = pointer.as_slice();
    expand_op.apply(&mut input, &mut counter)?;
    let written = counter.count();
    if written != true_size {
        exn::bail!(ErrorKind::SizeMismatch { name: name.to_string(), expected: true_size, actual: written });
    }

    let remainder = written % BLOCK_SIZE;
    if remainder != 0 {
        let padding = [0u8; BLOCK_SIZE as usize];
        out.write_all(&padding[..(BLOCK_SIZE - remainder) as usize]).or_raise(|| ErrorKind::Stream)?;
    }
    Ok(())
}

fn parse_pax(body: &[u8]) -> Result<Vec<(&str, &[u8])>> {
    PaxExtensions::new(body)
        .map(|ext| {
            let ext = ext.or_raise(|| ErrorKind::InvalidData("malformed PAX record".to_string()))?;
            let key = ext.key().or_raise(|| ErrorKind::InvalidData("non UTF-8 PAX key".to_string()))?;
            Ok((key, ext.value_bytes()))
        })
        .collect()
}

fn record<'a>(records: &[(&str, &'a [u8])], key: &str) -> Option<&'a [u8]> {
    records.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn parse_size(value: &[u8], name: Option<&str>) -> Result<u64> {
    std::str::from_utf8(value).ok().and_then(|s| s.parse().ok()).ok_or_raise(|| {
        ErrorKind::InvalidData(format!(
            "bad {PTRTAR_SIZE_KEY} value {:?} for {}",
            String::from_utf8_lossy(value),
            name.unwrap_or("next member"),
        ))
    })
}

/// Expansion that reproduces the original bytes when pointers are the file
/// contents themselves.
pub fn identity(input: &mut (dyn Read + Send), output: &mut dyn Write) -> io::Result<()> {
    io::copy(input, output).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tar::Header;

    fn pointer_archive(members: &[(&str, &[u8], Option<&str>)]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (name, body, size) in members {
            if let Some(size) = size {
                builder.append_pax_extensions([(PTRTAR_SIZE_KEY, size.as_bytes())]).unwrap();
            }
            let mut header = Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn repeat(input: &mut (dyn Read + Send), output: &mut dyn Write) -> io::Result<()> {
        // "<byte>x<count>" expands to count copies of byte.
        let mut pointer = String::new();
        input.read_to_string(&mut pointer)?;
        let (byte, count) = pointer.split_once('x').ok_or_else(|| io::Error::other("bad pointer"))?;
        let count: usize = count.parse().map_err(io::Error::other)?;
        output.write_all(&byte.as_bytes().repeat(count))
    }

    fn contents(archive: &[u8]) -> Vec<(String, Vec<u8>, u64)> {
        let mut archive = Archive::new(archive);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                assert!(entry.pax_extensions().unwrap().is_none());
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let size = entry.header().size().unwrap();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                (name, body, size)
            })
            .collect()
    }

    #[test]
    fn test_expands_pointers() {
        let input = pointer_archive(&[("a.bin", b"ax700", Some("700")), ("notes.txt", b"plain", None)]);
        let out = expand(input.as_slice(), &mut repeat, Vec::new()).unwrap();
        let contents = contents(&out);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0], ("a.bin".to_string(), vec![b'a'; 700], 700));
        assert_eq!(contents[1], ("notes.txt".to_string(), b"plain".to_vec(), 5));
        assert_eq!(out.len() % BLOCK_SIZE as usize, 0);
    }

    #[test]
    fn test_empty_expansion() {
        let input = pointer_archive(&[("empty", b"ex0", Some("0")), ("after", b"ok", None)]);
        let out = expand(input.as_slice(), &mut repeat, Vec::new()).unwrap();
        let contents = contents(&out);
        assert_eq!(contents[0], ("empty".to_string(), Vec::new(), 0));
        assert_eq!(contents[1].1, b"ok");
    }

    #[test]
    fn test_size_mismatch_stops_output() {
        let input = pointer_archive(&[("short", b"sx10", Some("11")), ("never", b"nx1", Some("1"))]);
        let mut calls = 0;
        let mut counted = |input: &mut (dyn Read + Send), output: &mut dyn Write| -> io::Result<()> {
            calls += 1;
            repeat(input, output)
        };
        let mut sink = Vec::new();
        let err = expand(input.as_slice(), &mut counted, &mut sink).unwrap_err();
        assert_eq!((*err).to_string(), "file short, was 10 bytes but header expected 11 bytes");
        assert_eq!(calls, 1);
        // The short member's header and body, without padding or an
        // end-of-archive trailer.
        assert_eq!(sink.len(), BLOCK_SIZE as usize + 10);
        assert!(sink.ends_with(b"ssssssssss"));
    }

    #[test]
    fn test_bad_size_record() {
        let input = pointer_archive(&[("a", b"ax1", Some("lots"))]);
        let err = expand(input.as_slice(), &mut repeat, Vec::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(msg) if msg.contains("lots")));
    }

    #[test]
    fn test_other_pax_records_survive() {
        let mut builder = Builder::new(Vec::new());
        builder
            .append_pax_extensions([("SCHILY.xattr.user.tag", b"blue".as_slice()), (PTRTAR_SIZE_KEY, b"3".as_slice())])
            .unwrap();
        let mut header = Header::new_gnu();
        header.set_size(4);
        builder.append_data(&mut header, "tagged", b"zx3\n".as_slice()).unwrap();
        builder.append_pax_extensions([("comment", b"unrelated".as_slice())]).unwrap();
        let mut header = Header::new_gnu();
        header.set_size(0);
        builder.append_data(&mut header, "plain", io::empty()).unwrap();
        let input = builder.into_inner().unwrap();

        let mut trim = |input: &mut (dyn Read + Send), output: &mut dyn Write| -> io::Result<()> {
            let mut pointer = String::new();
            input.read_to_string(&mut pointer)?;
            let mut pointer = pointer.trim_end().as_bytes();
            repeat(&mut pointer, output)
        };
        let out = expand(input.as_slice(), &mut trim, Vec::new()).unwrap();

        let mut archive = Archive::new(out.as_slice());
        let mut records = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let pax: Vec<(String, String)> = entry
                .pax_extensions()
                .unwrap()
                .map(|pax| pax.map(|e| e.unwrap()).map(|e| (e.key().unwrap().into(), e.value().unwrap().into())).collect())
                .unwrap_or_default();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            records.push((entry.path().unwrap().into_owned(), pax, body));
        }
        assert_eq!(records[0].1, [("SCHILY.xattr.user.tag".to_string(), "blue".to_string())]);
        assert_eq!(records[0].2, b"zzz");
        assert_eq!(records[1].1, [("comment".to_string(), "unrelated".to_string())]);
    }

    #[test]
    fn test_long_names() {
        let long = format!("{}/file.bin", "d".repeat(150));
        let input = pointer_archive(&[(&long, b"qx2", Some("3"))]);
        let err = expand(input.as_slice(), &mut repeat, Vec::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::SizeMismatch { name, .. } if *name == long));

        let input = pointer_archive(&[(&long, b"qx3", Some("3"))]);
        let out = expand(input.as_slice(), &mut repeat, Vec::new()).unwrap();
        assert_eq!(contents(&out), [(long, b"qqq".to_vec(), 3)]);
    }

    #[test]
    fn test_plain_tar_passes_through() {
        let input = pointer_archive(&[("a", b"alpha", None), ("b", b"", None)]);
        let out = expand(input.as_slice(), &mut identity, Vec::new()).unwrap();
        assert_eq!(out, input);
    }
}
