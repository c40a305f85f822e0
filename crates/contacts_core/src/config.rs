//! Runtime configuration for embedding callers.
//!
//! # Responsibility
//! - Collect database path, logging and lock-wait settings from the
//!   environment with documented defaults.
//!
//! # Invariants
//! - Unset variables fall back to defaults; malformed values are errors,
//!   never silently ignored.

use crate::db::{DbOptions, DEFAULT_BUSY_TIMEOUT};
use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "CONTACTS_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "CONTACTS_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "CONTACTS_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CONTACTS_BUSY_TIMEOUT_MS";

const DEFAULT_DB_FILE_NAME: &str = "contacts.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
        }
    }
}

impl Error for ConfigError {}

/// Settings consumed by `open_db_with_options` and `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let value_of = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = value_of(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path.trim());
        }
        if let Some(level) = value_of(ENV_LOG_LEVEL) {
            config.log_level = level.trim().to_string();
        }
        if let Some(dir) = value_of(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(raw) = value_of(ENV_BUSY_TIMEOUT_MS) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_BUSY_TIMEOUT_MS,
                    value: raw.clone(),
                })?;
            config.busy_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: self.busy_timeout,
        }
    }
}
