//! Environment-driven runtime configuration.
//!
//! # Responsibility
//! - Resolve store path, log level, log target and demo seeding from the
//!   process environment.
//!
//! # Invariants
//! - Unset or blank variables fall back to defaults; malformed values are
//!   reported instead of silently ignored.

use lineage_core::{default_log_level, LogTarget};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "LINEAGE_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "LINEAGE_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "LINEAGE_LOG_DIR";
pub const SEED_DEMO_ENV: &str = "LINEAGE_SEED_DEMO";

const DEFAULT_DB_FILE_NAME: &str = "lineage.sqlite3";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidLogDir(String),
    InvalidFlag { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogDir(message) => write!(f, "{LOG_DIR_ENV}: {message}"),
            Self::InvalidFlag { key, value } => {
                write!(f, "{key}: expected 1|0|true|false|yes|no, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_target: LogTarget,
    pub seed_demo: bool,
}

impl ApiConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns the raw value for a
    /// key or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = read(DB_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let log_level = read(LOG_LEVEL_ENV).unwrap_or_else(|| default_log_level().to_string());
        let log_target = match read(LOG_DIR_ENV) {
            Some(dir) => LogTarget::directory(&dir).map_err(ConfigError::InvalidLogDir)?,
            None => LogTarget::Stderr,
        };
        let seed_demo = match read(SEED_DEMO_ENV) {
            Some(raw) => parse_flag(SEED_DEMO_ENV, &raw)?,
            None => false,
        };

        Ok(Self {
            db_path,
            log_level,
            log_target,
            seed_demo,
        })
    }
}

/// Store file used when `LINEAGE_DB_PATH` is unset.
pub fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: raw.to_string(),
        }),
    }
}
