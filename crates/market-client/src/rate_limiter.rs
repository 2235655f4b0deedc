use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval throttle: grants are spaced at least `1 / rate` seconds
/// apart. The lock only covers reserving the next slot; waiting happens
/// outside it, so a slow caller never holds up the queue.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A non-positive rate disables throttling.
    pub fn per_second(rate: f64) -> Self {
        let interval = if rate > 0.0 && rate.is_finite() {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };

        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next slot.
    pub async fn acquire(&self) {
        let granted_at = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        let now = Instant::now();
        if granted_at > now {
            let wait = granted_at - now;
            tracing::debug!("Rate limiter: waiting {:.2}s for next slot", wait.as_secs_f64());
            tokio::time::sleep_until(granted_at).await;
        }
    }
}
