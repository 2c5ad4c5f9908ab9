//! Pipeline configuration.
//!
//! A single explicit [`Config`] value is constructed by the caller (or read
//! from the environment) and passed into every component. There is no global
//! configuration state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry/backoff settings for the call gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (3 retries = 4 attempts).
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// TTL settings for the two cache namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached file metadata, in seconds.
    pub metadata_ttl_secs: u64,
    /// TTL for cached analysis results, in seconds.
    pub analysis_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: 3600,
            analysis_ttl_secs: 7200,
        }
    }
}

impl CacheConfig {
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    pub fn analysis_ttl(&self) -> Duration {
        Duration::from_secs(self.analysis_ttl_secs)
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The tenant's primary domain; everything outside it is external.
    pub primary_domain: String,
    /// Domains whose links count as in-ecosystem document links.
    pub ecosystem_domains: Vec<String>,
    /// Files dispatched concurrently per batch window.
    pub batch_size: usize,
    /// Pacing delay between batch windows, in milliseconds.
    pub batch_pause_ms: u64,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_domain: String::new(),
            ecosystem_domains: vec![
                "docs.google.com".to_string(),
                "drive.google.com".to_string(),
                "sheets.google.com".to_string(),
                "slides.google.com".to_string(),
            ],
            batch_size: 50,
            batch_pause_ms: 500,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Build a config for the given tenant domain with all defaults.
    pub fn for_domain(primary_domain: impl Into<String>) -> Self {
        Self {
            primary_domain: primary_domain.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file when present (checks the parent directory as a
    /// fallback), then overrides defaults from `DRIVESCOPE_*` variables.
    /// `DRIVESCOPE_PRIMARY_DOMAIN` is required.
    pub fn from_env() -> Result<Self, String> {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_path("../.env");
        }

        let primary_domain = std::env::var("DRIVESCOPE_PRIMARY_DOMAIN")
            .map_err(|_| "DRIVESCOPE_PRIMARY_DOMAIN is not set".to_string())?;

        let mut config = Self::for_domain(primary_domain);

        if let Some(n) = env_parse("DRIVESCOPE_BATCH_SIZE") {
            config.batch_size = n;
        }
        if let Some(n) = env_parse("DRIVESCOPE_BATCH_PAUSE_MS") {
            config.batch_pause_ms = n;
        }
        if let Some(n) = env_parse("DRIVESCOPE_MAX_RETRIES") {
            config.retry.max_retries = n;
        }
        if let Some(n) = env_parse("DRIVESCOPE_METADATA_TTL_SECS") {
            config.cache.metadata_ttl_secs = n;
        }
        if let Some(n) = env_parse("DRIVESCOPE_ANALYSIS_TTL_SECS") {
            config.cache.analysis_ttl_secs = n;
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
