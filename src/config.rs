//! Service configuration, loaded from an optional TOML file.
//!
//! Mirrors the teacher's config-loading shape: a missing or empty file falls
//! back to defaults, the file is size-capped before read, and unknown keys
//! are logged rather than rejected so newer config files degrade gracefully
//! against older binaries.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config files larger than this are refused outright rather than parsed —
/// a malformed or maliciously huge file should not be read into memory whole.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config file is too large ({size} bytes, max {max})")]
    TooLarge { size: u64, max: u64 },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout for parsing a single feed's bytes into structured entries.
    pub feed_parse_timeout_secs: u64,
    /// Timeout for the HTTP fetch of a feed (or an HTML discovery probe).
    pub fetch_timeout_secs: u64,
    /// TTL applied to cached `find_or_fetch_feed_articles` results.
    pub cache_ttl_secs: u64,
    /// Above this many newly-resolved articles in one pass, content
    /// injection is skipped entirely rather than attempted in batches.
    pub max_article_injection_count: usize,
    /// Number of consecutive fetch failures before a feed is skipped by
    /// the circuit breaker.
    pub circuit_breaker_threshold: i64,
    /// Maximum feed response size accepted before aborting the fetch.
    pub max_feed_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_parse_timeout_secs: 10,
            fetch_timeout_secs: 30,
            cache_ttl_secs: 300,
            max_article_injection_count: 500,
            circuit_breaker_threshold: 5,
            max_feed_size_bytes: 10 * 1024 * 1024,
        }
    }
}

// Custom Debug so secrets (none today, but this mirrors the teacher's
// redaction pattern in case a credential field is added later) never leak
// into a log line via `{:?}`.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feed_parse_timeout_secs", &self.feed_parse_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field(
                "max_article_injection_count",
                &self.max_article_injection_count,
            )
            .field("circuit_breaker_threshold", &self.circuit_breaker_threshold)
            .field("max_feed_size_bytes", &self.max_feed_size_bytes)
            .finish()
    }
}

impl Config {
    /// Load config from `path`. A missing file, or one that is empty or
    /// whitespace-only, yields defaults rather than an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(path)?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                size: metadata.len(),
                max: MAX_CONFIG_FILE_SIZE,
            });
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Self::warn_on_unknown_keys(&content);

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Diff the raw TOML's top-level keys against the known fields and log a
    /// warning for anything unrecognized, instead of failing to parse.
    fn warn_on_unknown_keys(content: &str) {
        const KNOWN_KEYS: &[&str] = &[
            "feed_parse_timeout_secs",
            "fetch_timeout_secs",
            "cache_ttl_secs",
            "max_article_injection_count",
            "circuit_breaker_threshold",
            "max_feed_size_bytes",
        ];

        let Ok(raw) = toml::from_str::<toml::Value>(content) else {
            return;
        };
        let Some(table) = raw.as_table() else {
            return;
        };
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "unknown config key ignored");
            }
        }
    }
}
