use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_secs(2);

/// Shared cool-down window. While it is open every worker waiting on it sleeps until the same
/// deadline, so a burst of near-limit responses produces one pause rather than one per worker.
#[derive(Debug)]
pub struct BackoffController {
    interval: Duration,
    paused_until: Mutex<Option<Instant>>,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_INTERVAL)
    }
}

impl BackoffController {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            paused_until: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_backing_off(&self) -> bool {
        self.deadline().is_some()
    }

    /// Returns immediately unless a window is open, otherwise sleeps until it closes.
    pub async fn wait(&self) {
        while let Some(deadline) = self.deadline() {
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Opens a window unless one is already open, then sleeps through it. Returns whether
    /// this call opened the window.
    pub async fn trigger(&self) -> bool {
        let opened = {
            let mut paused_until = self
                .paused_until
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *paused_until {
                Some(deadline) if deadline > Instant::now() => false,
                _ => {
                    *paused_until = Some(Instant::now() + self.interval);
                    true
                }
            }
        };
        if opened {
            tracing::info!(
                interval_ms = self.interval.as_millis() as u64,
                "approaching rate limit, pausing workers"
            );
        }
        self.wait().await;
        opened
    }

    fn deadline(&self) -> Option<Instant> {
        let paused_until = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        paused_until.filter(|deadline| *deadline > Instant::now())
    }
}
