//! Introspection engine configuration.
//!
//! All durations accept human-readable strings (`"30s"`, `"5m"`).
//!
//! # Example
//!
//! ```toml
//! [introspection]
//! max_token_bytes = 8192
//! max_cache_ttl = "5m"
//! negative_cache_ttl = "30s"
//! expired_cache_ttl = "10s"
//! verification_timeout = "2s"
//!
//! [introspection.cache]
//! capacity = 10000
//! shards = 16
//! sweep_interval = "30s"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::token::DEFAULT_MAX_TOKEN_BYTES;

/// Configuration for the introspection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectionConfig {
    /// Tokens longer than this are rejected before decoding.
    pub max_token_bytes: usize,

    /// Upper bound on how long a valid result is cached.
    #[serde(with = "humantime_serde")]
    pub max_cache_ttl: Duration,

    /// How long malformed and bad-signature results are cached.
    #[serde(with = "humantime_serde")]
    pub negative_cache_ttl: Duration,

    /// How long expired results are cached.
    #[serde(with = "humantime_serde")]
    pub expired_cache_ttl: Duration,

    /// How long a caller waits for an evaluation before giving up.
    #[serde(with = "humantime_serde")]
    pub verification_timeout: Duration,

    /// Result cache sizing.
    pub cache: CacheConfig,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
            max_cache_ttl: Duration::from_secs(300),
            negative_cache_ttl: Duration::from_secs(30),
            expired_cache_ttl: Duration::from_secs(10),
            verification_timeout: Duration::from_secs(2),
            cache: CacheConfig::default(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl IntrospectionConfig {
    /// Sets the cache TTL bounds.
    #[must_use]
    pub fn with_ttls(mut self, max: Duration, negative: Duration, expired: Duration) -> Self {
        self.max_cache_ttl = max;
        self.negative_cache_ttl = negative;
        self.expired_cache_ttl = expired;
        self
    }

    /// Sets the verification timeout.
    #[must_use]
    pub fn with_verification_timeout(mut self, timeout: Duration) -> Self {
        self.verification_timeout = timeout;
        self
    }

    /// Sets the cache sizing.
    #[must_use]
    pub fn with_cache(mut self, capacity: usize, shards: usize) -> Self {
        self.cache.capacity = capacity;
        self.cache.shards = shards;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any bound is zero or the
    /// negative TTL exceeds the maximum TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_token_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_token_bytes must be > 0".to_string(),
            ));
        }

        if self.max_cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "max_cache_ttl must be > 0".to_string(),
            ));
        }

        if self.negative_cache_ttl > self.max_cache_ttl {
            return Err(ConfigError::InvalidValue(format!(
                "negative_cache_ttl ({:?}) must not exceed max_cache_ttl ({:?})",
                self.negative_cache_ttl, self.max_cache_ttl
            )));
        }

        if self.verification_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "verification_timeout must be > 0".to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.capacity must be > 0".to_string(),
            ));
        }

        if self.cache.shards == 0 || self.cache.shards > self.cache.capacity {
            return Err(ConfigError::InvalidValue(format!(
                "cache.shards must be between 1 and cache.capacity ({})",
                self.cache.capacity
            )));
        }

        if self.cache.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.sweep_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
