//! Configuration file parser for ~/.config/feedbell/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as likely typos. A handful of
//! `FEEDBELL_*` environment variables override the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::DEFAULT_CACHE_SECS;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration.
///
/// Every key is optional. `webhook_token` is masked in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; defaults to `feedbell.db` next to the config file.
    pub database_path: Option<PathBuf>,

    pub crawl_interval_secs: u64,

    pub notify_interval_secs: u64,

    /// Per-request bound for feed fetches and webhook calls.
    pub http_timeout_secs: u64,

    /// Longest cool-down a feed's Cache-Control may request.
    pub default_cache_secs: i64,

    /// Minimum spacing between outbound messages.
    pub rate_interval_ms: u64,

    pub autocomplete_ttl_secs: u64,

    pub autocomplete_max_results: usize,

    /// Accept feed links on localhost and private networks.
    pub allow_private_hosts: bool,

    /// Delivery endpoint. Without it, notifications are only logged.
    pub webhook_url: Option<String>,

    /// Bearer token sent to `webhook_url`.
    pub webhook_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            crawl_interval_secs: 3600,
            notify_interval_secs: 300,
            http_timeout_secs: 3,
            default_cache_secs: DEFAULT_CACHE_SECS,
            rate_interval_ms: 1000,
            autocomplete_ttl_secs: 15,
            autocomplete_max_results: 25,
            allow_private_hosts: false,
            webhook_url: None,
            webhook_token: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("crawl_interval_secs", &self.crawl_interval_secs)
            .field("notify_interval_secs", &self.notify_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("default_cache_secs", &self.default_cache_secs)
            .field("rate_interval_ms", &self.rate_interval_ms)
            .field("autocomplete_ttl_secs", &self.autocomplete_ttl_secs)
            .field("autocomplete_max_results", &self.autocomplete_max_results)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_token",
                &self.webhook_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

const KNOWN_KEYS: [&str; 11] = [
    "database_path",
    "crawl_interval_secs",
    "notify_interval_secs",
    "http_timeout_secs",
    "default_cache_secs",
    "rate_interval_ms",
    "autocomplete_ttl_secs",
    "autocomplete_max_results",
    "allow_private_hosts",
    "webhook_url",
    "webhook_token",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Longest interval, timeout or cool-down accepted (one year).
    const MAX_DURATION_SECS: u64 = 365 * 86_400;

    /// Load the file at `path`, then apply `FEEDBELL_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file only.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
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
                // Deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Override fields from environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FEEDBELL_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("FEEDBELL_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }
        if let Some(token) = lookup("FEEDBELL_WEBHOOK_TOKEN") {
            self.webhook_token = Some(token);
        }
        if let Some(value) = lookup("FEEDBELL_CRAWL_INTERVAL_SECS") {
            self.crawl_interval_secs = parse_env("FEEDBELL_CRAWL_INTERVAL_SECS", value)?;
        }
        if let Some(value) = lookup("FEEDBELL_NOTIFY_INTERVAL_SECS") {
            self.notify_interval_secs = parse_env("FEEDBELL_NOTIFY_INTERVAL_SECS", value)?;
        }
        Ok(())
    }

    /// Reject values the scheduler and clients cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("crawl_interval_secs", self.crawl_interval_secs),
            ("notify_interval_secs", self.notify_interval_secs),
            ("http_timeout_secs", self.http_timeout_secs),
            ("autocomplete_ttl_secs", self.autocomplete_ttl_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
            }
            if value > Self::MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be at most {} seconds",
                    Self::MAX_DURATION_SECS
                )));
            }
        }
        if self.default_cache_secs <= 0 || self.default_cache_secs > Self::MAX_DURATION_SECS as i64
        {
            return Err(ConfigError::Invalid(format!(
                "default_cache_secs must be between 1 and {} seconds",
                Self::MAX_DURATION_SECS
            )));
        }
        if self.rate_interval_ms > Self::MAX_DURATION_SECS * 1000 {
            return Err(ConfigError::Invalid(format!(
                "rate_interval_ms must be at most {} milliseconds",
                Self::MAX_DURATION_SECS * 1000
            )));
        }
        if self.autocomplete_max_results == 0 {
            return Err(ConfigError::Invalid(
                "autocomplete_max_results must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_secs)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn autocomplete_ttl(&self) -> Duration {
        Duration::from_secs(self.autocomplete_ttl_secs)
    }

    pub fn webhook_token(&self) -> Option<SecretString> {
        self.webhook_token.clone().map(SecretString::from)
    }
}

fn parse_env(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

// ============================================================================
// Tests
// ============================================================================
