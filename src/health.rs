//! Health Monitor Module
//!
//! Liveness checks against the API and the shared `ServerStatus` they
//! maintain. Checks never fail to the caller; every outcome is folded into
//! the status and a boolean.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{spawn_interval, Clock, TaskHandle};
use crate::config::HealthConfig;
use crate::transport::{ApiRequest, Transport};

/// Last known state of the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// `None` until the first check or API response
    pub is_online: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub is_checking: bool,
    pub is_awake: bool,
}

pub struct HealthMonitor {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
    status: Mutex<ServerStatus>,
    monitor: Mutex<Option<TaskHandle>>,
}

impl HealthMonitor {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, config: HealthConfig) -> Self {
        Self {
            transport,
            clock,
            config,
            status: Mutex::new(ServerStatus::default()),
            monitor: Mutex::new(None),
        }
    }

    /// Snapshot of the current status
    pub fn status(&self) -> ServerStatus {
        lock(&self.status).clone()
    }

    /// Probe the liveness endpoint; `true` on any 2xx.
    pub async fn check_health(&self, timeout: Duration) -> bool {
        self.update(|status| status.is_checking = true);
        let _checking = CheckingFlag(self);

        let request = ApiRequest::get(self.config.path.as_str());
        let deadline = timeout + self.config.grace;
        let outcome = tokio::time::timeout(deadline, self.transport.send(&request, timeout)).await;

        let healthy = match outcome {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Health check failed");
                false
            }
            Err(_) => {
                debug!(?deadline, "Health check abandoned after grace period");
                false
            }
        };

        if healthy {
            self.record_success();
        } else {
            self.record_failure();
        }
        healthy
    }

    /// Check with the configured default timeout
    pub async fn check_default(&self) -> bool {
        self.check_health(self.config.check_timeout).await
    }

    /// Evidence that the server answered.
    pub fn record_success(&self) {
        let now = self.clock.now();
        self.update(|status| {
            if status.is_online != Some(true) {
                info!("Server is online");
            }
            status.is_online = Some(true);
            status.is_awake = true;
            status.last_checked_at = Some(now);
            status.consecutive_failures = 0;
            status.is_checking = false;
        });
    }

    /// Evidence that the server could not be reached.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        self.update(|status| {
            status.is_online = Some(false);
            status.last_checked_at = Some(now);
            status.consecutive_failures += 1;
            status.is_checking = false;
            warn!(failures = status.consecutive_failures, "Server unreachable");
        });
    }

    /// Start periodic checks. No-op if already running.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut monitor = lock(&self.monitor);
        if monitor.is_some() {
            debug!("Server monitoring already running");
            return;
        }

        info!(interval = ?self.config.interval, "Starting server monitoring");
        let this = Arc::downgrade(self);
        *monitor = Some(spawn_interval(self.config.interval, move || {
            let this = this.clone();
            async move {
                if let Some(monitor) = this.upgrade() {
                    monitor.check_default().await;
                }
            }
        }));
    }

    /// Stop periodic checks. No-op if not running.
    pub fn stop_monitoring(&self) {
        if lock(&self.monitor).take().is_some() {
            info!("Server monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.monitor).is_some()
    }

    /// Poll until the server answers, doubling the delay between tries.
    pub async fn wait_for_server(&self, max_retries: u32, initial_delay: Duration) -> bool {
        let mut delay = initial_delay;

        for attempt in 1..=max_retries {
            if self.check_default().await {
                info!(attempt, "Server is ready");
                return true;
            }
            if attempt < max_retries {
                debug!(attempt, ?delay, "Server not ready, waiting");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.config.max_wait_delay);
            }
        }

        warn!(max_retries, "Server did not become ready");
        false
    }

    fn update(&self, f: impl FnOnce(&mut ServerStatus)) {
        f(&mut lock(&self.status));
    }
}

/// Clears `is_checking` when a check ends, including when it is cancelled.
struct CheckingFlag<'a>(&'a HealthMonitor);

impl Drop for CheckingFlag<'_> {
    fn drop(&mut self) {
        self.0.update(|status| status.is_checking = false);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
