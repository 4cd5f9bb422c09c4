//! Command Line Error Types

use derive_more::{Display, Error};
use ptrtar_archive::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};
use ptrtar_config::Error as ConfigError;
use ptrtar_config::error::ErrorKind as ConfigErrorKind;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("{_0}")]
    Config(ConfigErrorKind),
    #[display("no command given")]
    MissingCommand,
    #[display("invalid log filter {_0:?}")]
    LogFilter(#[error(not(source))] String),
    #[display("{_0}")]
    Archive(ArchiveErrorKind),
    /// Writing to stdout failed.
    #[display("could not write output")]
    Output,
}

impl ErrorKind {
    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Config(inner))
    }

    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Archive(inner))
    }

    /// Process exit code: 2 for problems with how ptrtar was set up, 1 for
    /// everything that went wrong while running.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::MissingCommand | Self::LogFilter(_) => 2,
            Self::Archive(_) | Self::Output => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Config(ConfigErrorKind::Invalid), 2)]
    #[case(ErrorKind::LogFilter("=nope".to_string()), 2)]
    #[case(ErrorKind::Archive(ArchiveErrorKind::Stream), 1)]
    #[case(ErrorKind::MissingCommand, 2)]
    #[case(ErrorKind::Output, 1)]
    fn test_exit_codes(#[case] kind: ErrorKind, #[case] expected: u8) {
        assert_eq!(kind.exit_code(), expected);
    }

    #[test]
    fn test_archive_errors_keep_their_message() {
        let err = ErrorKind::archive(exn::Exn::new(ArchiveErrorKind::SizeMismatch {
            name: "a".to_string(),
            expected: 2,
            actual: 1,
        }));
        assert_eq!((*err).to_string(), "file a, was 1 bytes but header expected 2 bytes");
    }
}
