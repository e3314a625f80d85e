//! Tuning knobs for the optimization layer, deserializable from the user config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Slowest accepted refill: one token every ~17 minutes
pub const MIN_REFILL_PER_SECOND: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst size
    pub capacity: u32,
    pub refill_per_second: f64,
    /// Cap on calls executing at once
    pub max_concurrent: Option<usize>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 5.0,
            max_concurrent: None,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ApiError::InvalidConfig("rate limit capacity must be at least 1".into()));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second < MIN_REFILL_PER_SECOND {
            return Err(ApiError::InvalidConfig(format!(
                "refill_per_second must be at least {MIN_REFILL_PER_SECOND}, got {}",
                self.refill_per_second
            )));
        }
        if self.max_concurrent == Some(0) {
            return Err(ApiError::InvalidConfig("max_concurrent must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: Option<u64>,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: Some(30_000),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub max_wait_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 20,
            max_wait_ms: 50,
        }
    }
}

impl BatchConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(ApiError::InvalidConfig("max_batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    /// Keep successful read results this long; no caching when absent
    pub cache_ttl_ms: Option<u64>,
}

impl DedupConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub dedup: DedupConfig,
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        self.rate_limit.validate()?;
        self.batch.validate()
    }
}
