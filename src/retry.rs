//! Bounded retry with a fixed interval.
//!
//! Health polls and backend checks retry through an explicit policy object
//! instead of open-coded sleep loops, so tests can inject a zero-delay policy.

use std::time::Duration;

/// Fixed-count, fixed-interval retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: Duration::ZERO,
        }
    }

    /// Run `attempt` until it reports success or the attempt budget runs out.
    ///
    /// Returns `true` when an attempt succeeded. The closure returning `false`
    /// means "not ready yet, keep polling"; errors are for the caller to model
    /// inside the closure (a failed check is just not-ready).
    pub async fn run<F, Fut>(&self, what: &str, mut attempt: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for n in 1..=self.max_attempts {
            if attempt().await {
                if n > 1 {
                    tracing::debug!("{} became ready on attempt {}/{}", what, n, self.max_attempts);
                }
                return true;
            }
            if n < self.max_attempts && !self.interval.is_zero() {
                tracing::debug!(
                    "{} not ready (attempt {}/{}), retrying in {:?}",
                    what,
                    n,
                    self.max_attempts,
                    self.interval
                );
                tokio::time::sleep(self.interval).await;
            }
        }
        tracing::warn!("{} not ready after {} attempts", what, self.max_attempts);
        false
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 10 x 500ms covers slow container cold starts without making a
        // doomed provisioning attempt hang for long.
        Self::new(10, Duration::from_millis(500))
    }
}
