//! Log output on stderr.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ptrtar_config::Config;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Install the global subscriber, then log the configuration it was built
/// from. `RUST_LOG` wins if it is set and valid; otherwise the configured
/// level shifted by the `-v`/`-q` counts is used.
pub fn init(config: &Config, verbose: u8, quiet: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = directive(&config.log_level, verbose, quiet);
            EnvFilter::try_new(&directive).or_raise(|| ErrorKind::LogFilter(directive.clone()))?
        },
    };
    // A second initialisation only happens in tests, keep the first one.
    _ = subscriber(filter, std::io::stderr).try_init();
    tracing::debug!(?config, "configuration loaded");
    Ok(())
}

fn subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .with(filter)
}

/// The filter directive for a configured level and the verbosity flags.
///
/// Plain levels move up or down the scale; anything else (a full directive
/// such as `ptrtar_cache=debug,warn`) is only replaced when a flag is given.
fn directive(configured: &str, verbose: u8, quiet: u8) -> String {
    let shift = i16::from(verbose) - i16::from(quiet);
    let configured = configured.trim();
    let base = LEVELS.iter().position(|level| level.eq_ignore_ascii_case(configured));
    match base {
        _ if shift == 0 => configured.to_string(),
        Some(base) => level_at(base as i16 + shift),
        None => level_at(2 + shift),
    }
}

fn level_at(index: i16) -> String {
    LEVELS[index.clamp(0, LEVELS.len() as i16 - 1) as usize].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_init_logs_configuration() {
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(subscriber(EnvFilter::new("debug"), captured.clone()));
        let config = Config { cache: Some("/tmp/ptrs.db".into()), ..Config::default() };

        init(&config, 0, 0).unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("configuration loaded"), "{output}");
        assert!(output.contains("/tmp/ptrs.db"), "{output}");
    }

    #[rstest]
    #[case("warn", 0, 0, "warn")]
    #[case("warn", 1, 0, "info")]
    #[case("warn", 2, 0, "debug")]
    #[case("warn", 9, 0, "trace")]
    #[case("warn", 0, 1, "error")]
    #[case("warn", 0, 5, "off")]
    #[case(" INFO ", 1, 0, "debug")]
    #[case("ptrtar_cache=debug,warn", 0, 0, "ptrtar_cache=debug,warn")]
    #[case("ptrtar_cache=debug,warn", 1, 0, "info")]
    fn test_directive(#[case] configured: &str, #[case] verbose: u8, #[case] quiet: u8, #[case] expected: &str) {
        assert_eq!(directive(configured, verbose, quiet), expected);
    }
}
