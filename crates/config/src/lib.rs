//! Layered configuration for ptrtar.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults;
//! 2. `config.toml` in the platform configuration directory (for example
//!    `~/.config/ptrtar/config.toml`), if it exists;
//! 3. the TOML file named by [`CONFIG_ENV`], if set;
//! 4. environment variables prefixed with [`ENV_PREFIX`], with `__` separating
//!    nested keys (`PTRTAR_RETRY__DELAY_MS=250`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use crate::error::Error;

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "PTRTAR_";
/// Environment variable naming an extra configuration file.
pub const CONFIG_ENV: &str = "PTRTAR_CONFIG";
const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pointer cache used by `create` when none is given on the command line.
    pub cache: Option<PathBuf>,
    /// Default log filter, e.g. `warn` or `ptrtar_cache=debug,info`.
    pub log_level: String,
    pub retry: Retry,
}

impl Default for Config {
    fn default() -> Self {
        Self { cache: None, log_level: "warn".to_string(), retry: Retry::default() }
    }
}

/// Pointer cache contention handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    /// Pause before each retry after the first, in milliseconds.
    pub delay_ms: u64,
    /// Give up after this many attempts; unset retries until the lock is free.
    pub max_attempts: Option<u32>,
    /// How long SQLite itself waits on a lock before reporting contention.
    pub busy_timeout_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self { delay_ms: 100, max_attempts: None, busy_timeout_ms: 1500 }
    }
}

impl Retry {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Config {
    /// Load the configuration from all sources.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_figment(Self::figment(default_file(), explicit)?)
    }

    /// Assemble the layered sources without extracting them.
    pub fn figment(default_file: Option<PathBuf>, explicit_file: Option<PathBuf>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        // The platform file is optional; a fresh machine has none.
        if let Some(path) = default_file.filter(|path| path.is_file()) {
            figment = figment.merge(Toml::file_exact(path));
        }
        if let Some(path) = explicit_file {
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path));
            }
            figment = figment.merge(Toml::file_exact(path));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__")))
    }

    /// Extract and validate a configuration.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidValue { field: "log_level", reason: "must not be empty" });
        }
        if self.retry.max_attempts == Some(0) {
            exn::bail!(ErrorKind::InvalidValue { field: "retry.max_attempts", reason: "must be at least 1" });
        }
        Ok(())
    }
}

/// `config.toml` in the platform configuration directory.
pub fn default_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ptrtar").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
