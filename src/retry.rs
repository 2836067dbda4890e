//! Retry Module
//!
//! Progressive-timeout retries for a cold backend. The first attempt gets a
//! short timeout so a warm server answers quickly; later attempts wait
//! longer, up to a cap, to ride out a cold start.
//!
//! Only transient failures are retried: timeouts, network errors with no
//! response, and HTTP 503. The last error is returned unchanged.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::ApiError;

/// Per-attempt timeout schedule: doubles from `initial` up to `cap`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressiveTimeout {
    pub initial: Duration,
    pub cap: Duration,
}

impl ProgressiveTimeout {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self { initial, cap }
    }

    /// Timeout for attempt `n` (1-based)
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << doublings).min(self.cap)
    }
}

/// Retry policy for [`execute_with_retry`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeouts: ProgressiveTimeout,
    /// Attempt `n` is followed by a pause of `n * retry_delay`
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            timeouts: ProgressiveTimeout::new(config.initial_timeout, config.max_timeout),
            retry_delay: config.retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Run `attempt` up to `max_retries` times in total.
///
/// `attempt` receives the timeout for that try.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    max_retries: u32,
    mut attempt: F,
) -> Result<T, ApiError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_retries = max_retries.max(1);
    let mut number = 1;

    loop {
        let timeout = policy.timeouts.for_attempt(number);
        debug!(attempt = number, ?timeout, "Executing request");

        match attempt(timeout).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && number < max_retries => {
                let backoff = policy.backoff(number);
                warn!(attempt = number, error = %e, ?backoff, "Transient failure, retrying");
                tokio::time::sleep(backoff).await;
                number += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(attempts = number, error = %e, "Giving up after retries");
                }
                return Err(e);
            }
        }
    }
}
