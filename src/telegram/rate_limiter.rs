//! Pacing for bulk Bot API calls.
//!
//! Broadcasts send one message per user. The limiter keeps a minimum gap
//! between sends and absorbs the flood waits Telegram asks for.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Gap between broadcast messages.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(50);

/// Hands out send slots at most once per `min_interval`.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// Earliest moment the next send may start. `None` before the first send.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Limiter tuned for broadcasts.
    #[must_use]
    pub fn for_broadcast() -> Self {
        Self::new(BROADCAST_INTERVAL)
    }

    /// Sleeps until the next slot is free and takes it.
    ///
    /// Returns how long the caller waited.
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let waited = next.map_or(Duration::ZERO, |slot| slot.saturating_duration_since(now));

        if !waited.is_zero() {
            debug!("Rate limiter: waiting {:?} before next send", waited);
            tokio::time::sleep(waited).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        waited
    }

    /// Sleeps through a flood wait requested by Telegram. The regular gap
    /// applies again afterwards.
    pub async fn handle_flood_wait(&self, wait: Duration) {
        warn!("Flood wait from Telegram: {} seconds", wait.as_secs());
        let mut next = self.next_slot.lock().await;
        tokio::time::sleep(wait).await;
        *next = Some(Instant::now() + self.min_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_send_is_immediate() {
        let limiter = RateLimiter::for_broadcast();
        assert_eq!(limiter.wait_and_acquire().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_second_send_waits_for_gap() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        limiter.wait_and_acquire().await;

        let waited = limiter.wait_and_acquire().await;
        assert!(waited > Duration::ZERO);
        assert!(waited <= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_flood_wait_restarts_gap() {
        let limiter = RateLimiter::new(Duration::from_millis(150));
        let started = Instant::now();
        limiter.handle_flood_wait(Duration::from_millis(20)).await;
        assert!(started.elapsed() >= Duration::from_millis(20));

        let waited = limiter.wait_and_acquire().await;
        assert!(waited > Duration::from_millis(50));
    }
}
