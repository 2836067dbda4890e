//! Configuration Module
//!
//! Timeouts, schedules and intervals for the API client. Defaults are tuned
//! for a free-tier backend that sleeps when idle.

use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

// TODO: Change this to the hosted API URL when deployed
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

const ENV_API_URL: &str = "PAWHUB_API_URL";
const ENV_REQUEST_TIMEOUT: &str = "PAWHUB_REQUEST_TIMEOUT_SECS";
const ENV_HEALTH_INTERVAL: &str = "PAWHUB_HEALTH_INTERVAL_SECS";
const ENV_KEEPALIVE_INTERVAL: &str = "PAWHUB_KEEPALIVE_INTERVAL_SECS";

/// Top-level client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for a single facade request
    pub request_timeout: Duration,
    pub refresh_path: String,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub wake: WakeConfig,
    pub keep_alive: KeepAliveConfig,
}

/// Progressive-timeout retry settings
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_timeout: Duration,
    pub max_timeout: Duration,
    /// Linear backoff unit: attempt `n` waits `n * retry_delay`
    pub retry_delay: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub path: String,
    pub check_timeout: Duration,
    /// Extra time granted on top of the check timeout before giving up on the call
    pub grace: Duration,
    pub interval: Duration,
    pub max_wait_delay: Duration,
}

/// Wake sequence settings
#[derive(Debug, Clone)]
pub struct WakeConfig {
    pub pings: u32,
    pub timeout_base: Duration,
    pub timeout_step: Duration,
    pub timeout_cap: Duration,
    pub delay_step: Duration,
    pub delay_cap: Duration,
}

#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_path: "/auth/refresh-token".to_string(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            wake: WakeConfig::default(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(8),
            max_timeout: Duration::from_secs(60),
            retry_delay: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            check_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(1),
            interval: Duration::from_secs(60),
            max_wait_delay: Duration::from_secs(30),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            pings: 8,
            timeout_base: Duration::from_secs(5),
            timeout_step: Duration::from_secs(5),
            timeout_cap: Duration::from_secs(30),
            delay_step: Duration::from_secs(2),
            delay_cap: Duration::from_secs(10),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        // Render-style free tiers suspend after 15 idle minutes
        Self { interval: Duration::from_secs(10 * 60) }
    }
}

impl ClientConfig {
    /// Build a config from defaults plus `PAWHUB_*` environment overrides.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.base_url = url;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_REQUEST_TIMEOUT)? {
            config.request_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_HEALTH_INTERVAL)? {
            config.health.interval = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_KEEPALIVE_INTERVAL)? {
            config.keep_alive.interval = secs;
        }

        Ok(config.normalized())
    }

    /// Strip any trailing slash so paths can be appended directly, and
    /// put zero intervals back to their defaults.
    pub fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if self.health.interval.is_zero() {
            warn!("Zero health check interval, using the default");
            self.health.interval = HealthConfig::default().interval;
        }
        if self.keep_alive.interval.is_zero() {
            warn!("Zero keep-alive interval, using the default");
            self.keep_alive.interval = KeepAliveConfig::default().interval;
        }
        self
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ApiError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(ApiError::Config(format!("{key} must be greater than zero"))),
            Ok(secs) => Ok(Some(Duration::from_secs(secs))),
            Err(e) => Err(ApiError::Config(format!("{key}={raw:?}: {e}"))),
        },
    }
}
