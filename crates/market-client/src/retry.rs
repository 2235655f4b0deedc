use std::time::Duration;

/// Retry budget and backoff schedule for upstream calls.
///
/// The delay before retry `n` (0-based) is `initial_backoff * factor^n`,
/// capped at `max_backoff`. No jitter, so schedules are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
    /// HTTP statuses treated as transient.
    pub retry_on_status: Vec<u16>,
    /// Whether timeouts and connection failures are retried.
    pub retry_on_transport: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            factor: 2.0,
            retry_on_status: (500..600).collect(),
            retry_on_transport: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on_status = statuses.into_iter().collect();
        self
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        let seconds = self.initial_backoff.as_secs_f64() * self.factor.powi(retry as i32);
        let capped = seconds.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(9), Duration::from_secs(10));
    }

    #[test]
    fn test_default_status_class() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(500));
        assert!(policy.should_retry_status(503));
        assert!(policy.should_retry_status(599));
        assert!(!policy.should_retry_status(404));
        assert!(!policy.should_retry_status(429));
    }

    #[test]
    fn test_custom_status_set() {
        let policy = RetryPolicy::default().with_statuses([429, 503]);
        assert!(policy.should_retry_status(429));
        assert!(!policy.should_retry_status(500));
    }
}
