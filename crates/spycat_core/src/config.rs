//! Environment-driven runtime configuration.
//!
//! # Responsibility
//! - Read storage, logging, breed directory and timeout settings from
//!   `SPYCAT_*` variables with defaults.
//!
//! # Invariants
//! - Unset variables fall back to defaults; set but malformed ones fail.
//! - Timeout budgets are strictly positive.

use crate::db::DEFAULT_POOL_SIZE;
use crate::logging::{default_log_level, normalize_level, normalize_log_dir};
use crate::service::breed::DEFAULT_BREED_API_URL;
use crate::service::timeout::TimeoutPolicy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "spycat.sqlite3";

pub const ENV_DB_PATH: &str = "SPYCAT_DB_PATH";
pub const ENV_DB_POOL_SIZE: &str = "SPYCAT_DB_POOL_SIZE";
pub const ENV_LOG_LEVEL: &str = "SPYCAT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SPYCAT_LOG_DIR";
pub const ENV_BREED_API_URL: &str = "SPYCAT_BREED_API_URL";
pub const ENV_TIMEOUT_BULK_READ_MS: &str = "SPYCAT_TIMEOUT_BULK_READ_MS";
pub const ENV_TIMEOUT_SINGLE_MS: &str = "SPYCAT_TIMEOUT_SINGLE_MS";
pub const ENV_TIMEOUT_TRANSACTION_MS: &str = "SPYCAT_TIMEOUT_TRANSACTION_MS";
pub const ENV_TIMEOUT_BREED_LOOKUP_MS: &str = "SPYCAT_TIMEOUT_BREED_LOOKUP_MS";
pub const ENV_TIMEOUT_CAT_INSERT_MS: &str = "SPYCAT_TIMEOUT_CAT_INSERT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid { key, value, reason } => {
                write!(f, "invalid {key}=`{value}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings shared by the core services and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub log_level: &'static str,
    /// `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
    pub breed_api_url: String,
    pub timeouts: TimeoutPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            log_level: default_log_level(),
            log_dir: None,
            breed_api_url: DEFAULT_BREED_API_URL.to_string(),
            timeouts: TimeoutPolicy::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; absent and blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = get(ENV_DB_POOL_SIZE) {
            config.pool_size = match raw.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::invalid(
                        ENV_DB_POOL_SIZE,
                        &raw,
                        "expected a positive integer",
                    ))
                }
            };
        }
        if let Some(raw) = get(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&raw)
                .map_err(|reason| ConfigError::invalid(ENV_LOG_LEVEL, &raw, reason))?;
        }
        if let Some(raw) = get(ENV_LOG_DIR) {
            config.log_dir = Some(
                normalize_log_dir(&raw)
                    .map_err(|reason| ConfigError::invalid(ENV_LOG_DIR, &raw, reason))?,
            );
        }
        if let Some(url) = get(ENV_BREED_API_URL) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    ENV_BREED_API_URL,
                    &url,
                    "expected an http(s) url",
                ));
            }
            config.breed_api_url = url;
        }

        let timeouts = &mut config.timeouts;
        for (key, slot) in [
            (ENV_TIMEOUT_BULK_READ_MS, &mut timeouts.bulk_read),
            (ENV_TIMEOUT_SINGLE_MS, &mut timeouts.single_entity),
            (ENV_TIMEOUT_TRANSACTION_MS, &mut timeouts.transactional),
            (ENV_TIMEOUT_BREED_LOOKUP_MS, &mut timeouts.breed_lookup),
            (ENV_TIMEOUT_CAT_INSERT_MS, &mut timeouts.cat_insert),
        ] {
            if let Some(raw) = get(key) {
                *slot = parse_millis(key, &raw)?;
            }
        }

        Ok(config)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::invalid(
            key,
            raw,
            "expected a positive number of milliseconds",
        )),
    }
}
