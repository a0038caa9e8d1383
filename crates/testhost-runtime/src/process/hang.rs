//! Hang detection.
//!
//! The controller touches the monitor on every IPC message from the test
//! host. When nothing arrives for the configured timeout the host is
//! considered hung.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Tracks the last sign of life from a test host.
#[derive(Debug)]
pub struct HangMonitor {
    timeout: Duration,
    last_activity: Mutex<Instant>,
}

impl HangMonitor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Records activity now.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Resolves with the idle time once the host has been silent for the
    /// timeout, or `None` when `cancel` fires first.
    pub async fn hung(&self, cancel: &CancellationToken) -> Option<Duration> {
        loop {
            let idle = self.idle_for();
            if idle >= self.timeout {
                return Some(idle);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.timeout - idle) => {}
            }
        }
    }
}
