//! Configuration Module
//!
//! Handles loading cache and lock settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Cache and lock configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between background TTL sweeps, in milliseconds
    pub sweep_interval_ms: u64,
    /// Maximum number of entries inspected per sweep tick
    pub sweep_batch: usize,
    /// Remote store connection URL
    pub redis_url: String,
    /// Lease length for acquired locks, in milliseconds
    pub lock_ttl_ms: u64,
    /// Deadline for a single acquisition attempt, in milliseconds
    pub lock_attempt_timeout_ms: u64,
    /// Sleep between acquisition attempts, in milliseconds
    pub lock_retry_interval_ms: u64,
    /// Number of retries after the first acquisition attempt
    pub lock_max_retries: u32,
    /// Interval between lease refreshes, in milliseconds
    pub refresh_interval_ms: u64,
    /// Deadline for a single refresh call, in milliseconds
    pub refresh_timeout_ms: u64,
    /// Consecutive refresh timeouts tolerated before the lease is given up
    pub refresh_max_timeouts: u32,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL_MS` - TTL sweep interval (default: 1000)
    /// - `SWEEP_BATCH` - Entries inspected per sweep (default: 1000)
    /// - `REDIS_URL` - Remote store URL (default: redis://127.0.0.1:6379)
    /// - `LOCK_TTL_MS` - Lease length (default: 10000)
    /// - `LOCK_ATTEMPT_TIMEOUT_MS` - Per-attempt deadline (default: 500)
    /// - `LOCK_RETRY_INTERVAL_MS` - Retry interval (default: 100)
    /// - `LOCK_MAX_RETRIES` - Retry budget (default: 10)
    /// - `REFRESH_INTERVAL_MS` - Lease refresh interval (default: 3000)
    /// - `REFRESH_TIMEOUT_MS` - Refresh deadline (default: 500)
    /// - `REFRESH_MAX_TIMEOUTS` - Tolerated consecutive refresh timeouts (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            sweep_batch: env_or("SWEEP_BATCH", defaults.sweep_batch),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            lock_ttl_ms: env_or("LOCK_TTL_MS", defaults.lock_ttl_ms),
            lock_attempt_timeout_ms: env_or(
                "LOCK_ATTEMPT_TIMEOUT_MS",
                defaults.lock_attempt_timeout_ms,
            ),
            lock_retry_interval_ms: env_or(
                "LOCK_RETRY_INTERVAL_MS",
                defaults.lock_retry_interval_ms,
            ),
            lock_max_retries: env_or("LOCK_MAX_RETRIES", defaults.lock_max_retries),
            refresh_interval_ms: env_or("REFRESH_INTERVAL_MS", defaults.refresh_interval_ms),
            refresh_timeout_ms: env_or("REFRESH_TIMEOUT_MS", defaults.refresh_timeout_ms),
            refresh_max_timeouts: env_or("REFRESH_MAX_TIMEOUTS", defaults.refresh_max_timeouts),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_attempt_timeout_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            sweep_batch: 1000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            lock_ttl_ms: 10_000,
            lock_attempt_timeout_ms: 500,
            lock_retry_interval_ms: 100,
            lock_max_retries: 10,
            refresh_interval_ms: 3000,
            refresh_timeout_ms: 500,
            refresh_max_timeouts: 3,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
