//! Subcommand implementations.

use crate::cli::{CreateArgs, ListPtrsArgs, ToTarArgs};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use ptrtar_archive::CommandTransform;
use ptrtar_cache::{BlockingPointerCache, Options, RetryPolicy};
use ptrtar_config::Config;
use std::ffi::OsString;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::instrument;

#[instrument(skip_all)]
pub fn create(args: &CreateArgs, config: &Config) -> Result<()> {
    let mut pointer_op = transform(&args.command)?;
    let roots = match args.dirs.is_empty() {
        true => vec![PathBuf::from(".")],
        false => args.dirs.clone(),
    };
    let mut excludes = args.excludes.clone();
    let cache_path = args.cache.as_ref().or(config.cache.as_ref());

    let mut cache = None;
    if let Some(path) = cache_path {
        // The cache file changes while it is being archived around.
        excludes.push(path.clone());
        excludes.push(journal(path));
        match BlockingPointerCache::open(path, &cache_options(config)) {
            Ok(opened) => cache = Some(opened),
            Err(err) => tracing::warn!(error = ?err, "non fatal error opening cache, archiving without it"),
        }
    }

    let out = BufWriter::new(io::stdout().lock());
    let created = ptrtar_archive::create(&roots, &excludes, &mut pointer_op, cache.as_mut(), out);
    // Pointers computed before a failure are still valid, keep them.
    if let Some(cache) = cache
        && let Err(err) = cache.close()
    {
        tracing::warn!(error = ?err, "non fatal error closing cache");
    }
    let (out, summary) = created.map_err(ErrorKind::archive)?;
    flush(out)?;
    tracing::info!(
        entries = summary.entries,
        files = summary.files,
        cache_hits = summary.cache_hits,
        excluded = summary.excluded,
        "archive created"
    );
    Ok(())
}

#[instrument(skip_all)]
pub fn to_tar(args: &ToTarArgs) -> Result<()> {
    let mut expand_op = transform(&args.command)?;
    let out = BufWriter::new(io::stdout().lock());
    let out = ptrtar_archive::expand(io::stdin().lock(), &mut expand_op, out).map_err(ErrorKind::archive)?;
    flush(out)
}

#[instrument(skip_all)]
pub fn list_ptrs(args: &ListPtrsArgs) -> Result<()> {
    let out = BufWriter::new(io::stdout().lock());
    let out = ptrtar_archive::list_pointers(io::stdin().lock(), out, args.newline).map_err(ErrorKind::archive)?;
    flush(out)
}

fn transform(argv: &[OsString]) -> Result<CommandTransform> {
    CommandTransform::from_argv(argv).ok_or_raise(|| ErrorKind::MissingCommand)
}

fn flush(mut out: impl Write) -> Result<()> {
    out.flush().or_raise(|| ErrorKind::Output)
}

/// SQLite's rollback journal next to the cache file.
fn journal(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("-journal");
    PathBuf::from(name)
}

fn cache_options(config: &Config) -> Options {
    Options {
        retry: RetryPolicy { delay: config.retry.delay(), max_attempts: config.retry.max_attempts },
        busy_timeout: config.retry.busy_timeout(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transform_needs_a_program() {
        assert_eq!(*transform(&[]).unwrap_err(), ErrorKind::MissingCommand);
        assert!(transform(&[OsString::from("cat")]).is_ok());
    }

    #[test]
    fn test_journal_path() {
        assert_eq!(journal(Path::new("/var/cache/ptrs.db")), Path::new("/var/cache/ptrs.db-journal"));
    }

    #[test]
    fn test_cache_options_follow_config() {
        let mut config = Config::default();
        assert_eq!(cache_options(&config), Options::default());
        config.retry.delay_ms = 5;
        config.retry.max_attempts = Some(2);
        config.retry.busy_timeout_ms = 10;
        let options = cache_options(&config);
        assert_eq!(options.retry, RetryPolicy { delay: Duration::from_millis(5), max_attempts: Some(2) });
        assert_eq!(options.busy_timeout, Duration::from_millis(10));
    }
}
