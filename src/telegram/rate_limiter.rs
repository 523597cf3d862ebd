//! Rate limiter for chat uploads.
//!
//! Keeps a minimum gap between consecutive uploads and honours the
//! `retry_after` hint Telegram returns when a chat is flooded.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between uploads.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may start.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Waits until an operation is allowed, then reserves the next slot.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();

        let wait_duration = next.map_or(Duration::ZERO, |at| at.saturating_duration_since(now));

        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next upload", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Minimum gap between two operations.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns the time remaining until the next operation is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let next = self.next_allowed.lock().await;
        next.map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
    }

    /// Handles a flood wait from Telegram by pushing back the next slot.
    ///
    /// Does not sleep; the following `wait_and_acquire` does.
    pub async fn handle_flood_wait(&self, retry_after: Duration) {
        warn!("Received flood wait from Telegram: {:?}", retry_after);

        let mut next = self.next_allowed.lock().await;
        let blocked_until = Instant::now() + retry_after;
        if next.is_none_or(|at| at < blocked_until) {
            *next = Some(blocked_until);
        }
    }
}
