//! Configuration file parser for the worker's TOML config.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`; unknown keys are accepted but logged as warnings.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES};
use crate::worker::{WorkerConfig, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL};

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV_VAR: &str = "FEEDWORKER_DB";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML with a value the worker cannot run with.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level worker configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file (`:memory:` for a throwaway database).
    pub database_path: String,

    /// Seconds to sleep between the end of one cycle and the next.
    pub poll_interval_secs: u64,

    /// Maximum feeds fetched per cycle. Must be positive.
    pub batch_size: usize,

    /// Bound on one whole feed fetch, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted feed body size.
    pub max_feed_bytes: usize,

    /// User-Agent header sent with every fetch.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedworker.db".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            batch_size: DEFAULT_BATCH_SIZE.get(),
            request_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            user_agent: format!("feedworker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "poll_interval_secs",
        "batch_size",
        "request_timeout_secs",
        "max_feed_bytes",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path,
            batch_size = config.batch_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FEEDWORKER_DB` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_database_override(std::env::var(DATABASE_ENV_VAR).ok());
    }

    fn apply_database_override(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|v| !v.trim().is_empty()) {
            tracing::debug!(path = %path, "Database path overridden by environment");
            self.database_path = path;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid("max_feed_bytes must be at least 1".into()));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path must not be empty".into()));
        }
        Ok(())
    }

    /// Loop parameters for the scheduler.
    pub fn worker_config(&self) -> Result<WorkerConfig, ConfigError> {
        let batch_size = NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| ConfigError::Invalid("batch_size must be at least 1".into()))?;
        Ok(WorkerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            batch_size,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
