//! Keep-Alive Module
//!
//! Pings the backend on a fixed period while the app is in the foreground
//! so the host does not suspend it. Backgrounding stops the pings;
//! returning to the foreground restarts them with an immediate ping.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::clock::{spawn_interval, TaskHandle};
use crate::health::HealthMonitor;

/// Foreground/background state supplied by the host environment
pub trait ForegroundSignal: Send + Sync {
    fn is_foreground(&self) -> bool;

    /// Receiver that observes every transition
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Stock [`ForegroundSignal`] the host flips from its lifecycle callbacks
#[derive(Debug)]
pub struct ForegroundState {
    tx: watch::Sender<bool>,
}

impl ForegroundState {
    pub fn new(foreground: bool) -> Self {
        let (tx, _) = watch::channel(foreground);
        Self { tx }
    }

    pub fn set_foreground(&self, foreground: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == foreground {
                return false;
            }
            *current = foreground;
            true
        });
        if changed {
            debug!(foreground, "App lifecycle changed");
        }
    }
}

impl ForegroundSignal for ForegroundState {
    fn is_foreground(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct KeepAlive {
    inner: Arc<Pinger>,
    watcher: Mutex<Option<TaskHandle>>,
}

struct Pinger {
    monitor: Arc<HealthMonitor>,
    foreground: Arc<dyn ForegroundSignal>,
    period: Duration,
    ticker: Mutex<Option<TaskHandle>>,
}

impl Pinger {
    fn start_ticker(&self) {
        let mut ticker = lock(&self.ticker);
        if ticker.is_some() {
            return;
        }

        let monitor = Arc::clone(&self.monitor);
        let foreground = Arc::clone(&self.foreground);
        *ticker = Some(spawn_interval(self.period, move || {
            let monitor = Arc::clone(&monitor);
            let foreground = Arc::clone(&foreground);
            async move {
                if !foreground.is_foreground() {
                    debug!("App in background, skipping keep-alive ping");
                    return;
                }
                monitor.check_default().await;
            }
        }));
    }

    fn stop_ticker(&self) {
        lock(&self.ticker).take();
    }

    fn is_ticking(&self) -> bool {
        lock(&self.ticker).is_some()
    }
}

impl KeepAlive {
    pub fn new(
        monitor: Arc<HealthMonitor>,
        foreground: Arc<dyn ForegroundSignal>,
        period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Pinger {
                monitor,
                foreground,
                period,
                ticker: Mutex::new(None),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Start pinging. No-op if already started.
    pub fn start(&self) {
        let mut watcher = lock(&self.watcher);
        if watcher.is_some() {
            return;
        }

        info!(period = ?self.inner.period, "Starting keep-alive");

        let mut lifecycle = self.inner.foreground.subscribe();
        if *lifecycle.borrow_and_update() {
            self.inner.start_ticker();
        }

        let pinger = Arc::clone(&self.inner);
        *watcher = Some(TaskHandle::spawn(async move {
            while lifecycle.changed().await.is_ok() {
                let foreground = *lifecycle.borrow_and_update();
                if foreground {
                    info!("App foregrounded, resuming keep-alive");
                    pinger.start_ticker();
                } else {
                    info!("App backgrounded, pausing keep-alive");
                    pinger.stop_ticker();
                }
            }
        }));
    }

    /// Stop pinging. No-op if not started.
    pub fn stop(&self) {
        if lock(&self.watcher).take().is_some() {
            self.inner.stop_ticker();
            info!("Keep-alive stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.watcher).is_some()
    }

    /// Whether pings are currently scheduled (running and foregrounded)
    pub fn is_pinging(&self) -> bool {
        self.inner.is_ticking()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::testing::{FixedClock, ScriptedTransport};

    const PERIOD: Duration = Duration::from_secs(600);
    const SETTLE: Duration = Duration::from_millis(1);

    fn keep_alive(foreground: bool) -> (KeepAlive, Arc<ForegroundState>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&transport) as Arc<_>,
            Arc::new(FixedClock::new()),
            HealthConfig::default(),
        ));
        let state = Arc::new(ForegroundState::new(foreground));
        let keep_alive = KeepAlive::new(monitor, Arc::clone(&state) as Arc<_>, PERIOD);
        (keep_alive, state, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_period_in_foreground() {
        let (keep_alive, _state, transport) = keep_alive(true);

        keep_alive.start();
        keep_alive.start();
        tokio::time::sleep(PERIOD * 2 + SETTLE).await;

        assert_eq!(transport.count("/health"), 3);
        keep_alive.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn no_pings_while_backgrounded() {
        let (keep_alive, _state, transport) = keep_alive(false);

        keep_alive.start();
        assert!(keep_alive.is_running());
        assert!(!keep_alive.is_pinging());

        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(transport.count("/health"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_foreground_pings_immediately() {
        let (keep_alive, state, transport) = keep_alive(false);
        keep_alive.start();
        tokio::time::sleep(PERIOD / 2).await;

        state.set_foreground(true);
        tokio::time::sleep(SETTLE).await;
        assert_eq!(transport.count("/health"), 1);

        tokio::time::sleep(PERIOD).await;
        assert_eq!(transport.count("/health"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backgrounding_stops_pings() {
        let (keep_alive, state, transport) = keep_alive(true);
        keep_alive.start();
        tokio::time::sleep(SETTLE).await;
        assert_eq!(transport.count("/health"), 1);

        state.set_foreground(false);
        tokio::time::sleep(SETTLE).await;
        assert!(!keep_alive.is_pinging());

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(transport.count("/health"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_final() {
        let (keep_alive, state, transport) = keep_alive(true);
        keep_alive.start();
        tokio::time::sleep(SETTLE).await;

        keep_alive.stop();
        keep_alive.stop();
        assert!(!keep_alive.is_running());

        // Lifecycle changes after stop do not restart pings
        state.set_foreground(false);
        state.set_foreground(true);
        tokio::time::sleep(PERIOD * 2).await;
        assert_eq!(transport.count("/health"), 1);
    }
}
