use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;

/// Backoff policy for best-effort external calls (block explorer API)
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
}

impl RetryStrategy {
    pub fn new(max_elapsed: Duration) -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed,
        }
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn retries_enabled(&self) -> bool {
        !self.max_elapsed.is_zero()
    }

    pub fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    pub fn is_retryable_error(&self, error: &str) -> bool {
        // Determine if error is transient and should be retried
        let error = error.to_ascii_lowercase();
        error.contains("timeout")
            || error.contains("timed out")
            || error.contains("connection")
            || error.contains("network")
            || error.contains("429")
            || error.contains("502")
            || error.contains("503")
            || error.contains("504")
            || error.contains("rate limit")
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}
