//! Extracting the pointers from a pointer archive.

use crate::PTRTAR_SIZE_KEY;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{self, Read, Write};
use tar::{Archive, Entry};
use tracing::instrument;

/// Copy the body of every pointer member of the archive read from `input` to
/// `out`, in archive order, each followed by a newline if `newline` is set.
/// Members without a [`PTRTAR_SIZE_KEY`] record are skipped.
#[instrument(skip(input, out))]
pub fn list_pointers<R: Read, W: Write>(input: R, mut out: W, newline: bool) -> Result<W> {
    let mut archive = Archive::new(input);
    let mut listed: u64 = 0;
    for entry in archive.entries().or_raise(|| ErrorKind::Stream)? {
        let mut entry = entry.or_raise(|| ErrorKind::InvalidData("unreadable header".to_string()))?;
        if !is_pointer(&mut entry).or_raise(|| ErrorKind::Stream)? {
            continue;
        }
        io::copy(&mut entry, &mut out).or_raise(|| ErrorKind::Stream)?;
        if newline {
            out.write_all(b"\n").or_raise(|| ErrorKind::Stream)?;
        }
        listed += 1;
    }
    tracing::debug!(listed, "pointers listed");
    Ok(out)
}

fn is_pointer<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<bool> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(false);
    };
    for extension in extensions {
        if extension?.key() == Ok(PTRTAR_SIZE_KEY) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tar::{Builder, Header};

    fn archive() -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        let mut append = |name: &str, body: &[u8], pax: &[(&str, &[u8])]| {
            if !pax.is_empty() {
                builder.append_pax_extensions(pax.iter().copied()).unwrap();
            }
            let mut header = Header::new_gnu();
            header.set_size(body.len() as u64);
            builder.append_data(&mut header, name, body).unwrap();
        };
        append("one", b"ptr-1", &[(PTRTAR_SIZE_KEY, b"10")]);
        append("plain", b"not a pointer", &[]);
        append("other-pax", b"also not", &[("comment", b"hi")]);
        append("two", b"ptr-2", &[("comment", b"x"), (PTRTAR_SIZE_KEY, b"20")]);
        builder.into_inner().unwrap()
    }

    #[rstest]
    #[case::concatenated(false, "ptr-1ptr-2")]
    #[case::one_per_line(true, "ptr-1\nptr-2\n")]
    fn test_lists_pointer_bodies(#[case] newline: bool, #[case] expected: &str) {
        let input = archive();
        let out = list_pointers(input.as_slice(), Vec::new(), newline).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_no_pointers() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_size(3);
        builder.append_data(&mut header, "a", b"abc".as_slice()).unwrap();
        let input = builder.into_inner().unwrap();
        assert!(list_pointers(input.as_slice(), Vec::new(), true).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_archive() {
        let mut input = archive();
        input.truncate(700);
        assert!(list_pointers(input.as_slice(), Vec::new(), false).is_err());
    }
}
