//! Clock Module
//!
//! Wall-clock source and the interval scheduler used by background tasks.
//! Delays and intervals run on Tokio's timer, so tests drive them with a
//! paused virtual clock.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Source of wall-clock timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle to a spawned background task.
///
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct TaskHandle {
    task: JoinHandle<()>,
}

impl TaskHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { task: tokio::spawn(future) }
    }

    /// Stop the task now.
    pub fn cancel(self) {
        // Drop does the abort.
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Shortest period [`spawn_interval`] will run at
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Run `tick` every `period`, starting immediately.
///
/// Ticks are awaited in sequence; a slow tick delays the next one rather
/// than piling up. A period below [`MIN_PERIOD`] is raised to it. Must be
/// called from within a Tokio runtime.
pub fn spawn_interval<F, Fut>(period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskHandle::spawn(async move {
        let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            tick().await;
        }
    })
}
