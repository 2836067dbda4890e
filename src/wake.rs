//! Wake Sequencer Module
//!
//! Coaxes a sleeping backend into starting with a bounded burst of health
//! checks. Each ping waits longer than the last, and the pause between
//! pings grows too, both up to a cap.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::WakeConfig;
use crate::health::HealthMonitor;

pub struct WakeSequencer {
    monitor: Arc<HealthMonitor>,
    config: WakeConfig,
}

impl WakeSequencer {
    pub fn new(monitor: Arc<HealthMonitor>, config: WakeConfig) -> Self {
        Self { monitor, config }
    }

    /// Timeout for ping `k` (1-based)
    pub fn ping_timeout(&self, ping: u32) -> Duration {
        let step = self.config.timeout_step.saturating_mul(ping.saturating_sub(1));
        (self.config.timeout_base + step).min(self.config.timeout_cap)
    }

    /// Pause after failed ping `k` (1-based)
    pub fn ping_delay(&self, ping: u32) -> Duration {
        self.config.delay_step.saturating_mul(ping).min(self.config.delay_cap)
    }

    /// Run the sequence; `true` as soon as one ping succeeds.
    ///
    /// `false` is a soft failure and callers should carry on.
    pub async fn wake(&self) -> bool {
        let pings = self.config.pings;
        info!(pings, "Waking server");

        for ping in 1..=pings {
            let timeout = self.ping_timeout(ping);
            debug!(ping, ?timeout, "Wake ping");

            if self.monitor.check_health(timeout).await {
                info!(ping, "Server is awake");
                return true;
            }

            if ping < pings {
                tokio::time::sleep(self.ping_delay(ping)).await;
            }
        }

        warn!(pings, "Server did not wake up");
        false
    }
}
