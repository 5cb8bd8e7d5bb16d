//! Mediator configuration.
//!
//! Every setting has a default, so an empty document is a valid configuration.
//! Values can be set in code with the `with_*` methods or loaded from TOML:
//!
//! ```
//! use mediator_runtime::config::{MediatorConfig, PublishStrategy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MediatorConfig::from_toml_str(
//!     r#"
//!     [publish]
//!     strategy = "sequential"
//!
//!     [performance]
//!     slow_threshold_ms = 250
//!     "#,
//! )?;
//!
//! assert_eq!(config.publish.strategy, PublishStrategy::Sequential);
//! assert_eq!(config.performance.slow_threshold_ms, 250);
//! assert_eq!(config.cache.ttl_secs, 600);
//! # Ok(())
//! # }
//! ```

use crate::publishers::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid TOML or does not match the schema
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// How notification handlers are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// One after another, in registration order
    Sequential,
    /// All at once, waiting for every handler
    #[default]
    Concurrent,
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Notification publishing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Fan-out strategy
    pub strategy: PublishStrategy,
    /// Failure reporting of the concurrent strategy
    pub failure_policy: FailurePolicy,
}

/// Response cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of cached responses, in seconds
    pub ttl_secs: u64,
    /// Maximum number of entries in the in-memory store
    pub capacity: usize,
}

impl CacheConfig {
    /// Validate cache configuration
    ///
    /// # Errors
    ///
    /// Returns error if the TTL or capacity is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::Validation("cache.ttl_secs must be > 0".to_string()));
        }
        if self.capacity == 0 {
            return Err(ConfigError::Validation("cache.capacity must be > 0".to_string()));
        }
        Ok(())
    }

    /// Get TTL as Duration
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            capacity: 10_000,
        }
    }
}

/// Slow request detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Requests processed before timing starts
    pub warmup_requests: u64,
    /// Elapsed time above which a request is reported, in milliseconds
    pub slow_threshold_ms: u64,
}

impl PerformanceConfig {
    /// Get the threshold as Duration
    #[must_use]
    pub const fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            warmup_requests: 3,
            slow_threshold_ms: 500,
        }
    }
}

/// Complete mediator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Notification publishing
    pub publish: PublishConfig,
    /// Response caching
    pub cache: CacheConfig,
    /// Slow request detection
    pub performance: PerformanceConfig,
}

impl MediatorConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Validation`] for out-of-range values
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    ///
    /// # Errors
    ///
    /// Returns error if any section is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()
    }

    /// Set the fan-out strategy
    #[must_use]
    pub const fn with_publish_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.publish.strategy = strategy;
        self
    }

    /// Set the concurrent failure policy
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.publish.failure_policy = policy;
        self
    }

    /// Set the cache TTL
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the cache capacity
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = capacity;
        self
    }

    /// Set the number of warm-up requests
    #[must_use]
    pub const fn with_warmup_requests(mut self, warmup: u64) -> Self {
        self.performance.warmup_requests = warmup;
        self
    }

    /// Set the slow request threshold
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.performance.slow_threshold_ms = threshold.as_millis() as u64;
        self
    }
}
