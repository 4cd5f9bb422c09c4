//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source couldn't be parsed or a value has the wrong type.
    #[display("invalid configuration")]
    Invalid,
    /// A value parsed but is out of range.
    #[display("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: &'static str },
    /// An explicitly named configuration file doesn't exist.
    #[display("configuration file {} does not exist", _0.display())]
    MissingFile(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Configuration errors need a human to fix them.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
