//! Exponential backoff for rate-limited provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use super::error::GatewayError;

/// Retry policy for rate-limited calls.
///
/// After failed attempt `k` (0-indexed) the caller waits
/// `initial_delay * backoff_factor^k` before trying again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_factor,
        }
    }

    /// Returns the wait that follows failed attempt `attempt` (0-indexed).
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Runs `op` until it succeeds, fails with a non-rate-limit error, or the
/// policy's attempts are exhausted.
///
/// Only [`GatewayError::RateLimitExceeded`] is retried; any other error is
/// returned immediately. When attempts run out the last rate-limit error is
/// returned.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limit() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    provider,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limit hit, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_rate_limit() {
                    error!(provider, max_attempts, "Rate limit exceeded after all attempts");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn rate_limited() -> GatewayError {
        GatewayError::RateLimitExceeded {
            provider: "mock".to_string(),
            message: "429".to_string(),
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(8));
    }

    #[test]
    fn huge_backoff_saturates_instead_of_panicking() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2), 1.0e30);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);

        let instant = RetryPolicy::new(5, Duration::ZERO, 1.0e300);
        assert_eq!(instant.delay_for_attempt(10), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, 2.0).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let result = call_with_retry(&policy, "mock", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_last_rate_limit_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let result: Result<(), _> = call_with_retry(&policy, "mock", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(rate_limited()) }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limit());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No wait after the final attempt.
        assert!(start.elapsed() < Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = call_with_retry(&policy, "mock", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::transient("mock", "HTTP 500")) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
