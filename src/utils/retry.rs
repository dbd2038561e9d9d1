use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// attempt 1 runs immediately; before attempt n+1 the caller waits
// initial_delay * multiplier^(n-1), capped at max_delay. Errors classified as
// permanent end the loop at once.
//
// ============================================================================

/// Backoff growth below this would make retries bunch up on a struggling broker
pub const MIN_MULTIPLIER: f64 = 2.0;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::publishing(3, Duration::from_secs(1), MIN_MULTIPLIER)
    }
}

impl RetryConfig {
    /// `max_retries` counts retries after the first attempt. The multiplier is
    /// raised to `MIN_MULTIPLIER` when lower.
    pub fn publishing(max_retries: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: multiplier.max(MIN_MULTIPLIER),
        }
    }

    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..self.clone()
        }
    }

    /// Wait before retry number `retry` (1-based)
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Outcome of a retried operation; failures report how many attempts ran
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    Exhausted { error: E, attempts: u32 },
    PermanentFailure { error: E, attempts: u32 },
}

/// Classification that drives retry: transient errors may succeed on a later
/// attempt, anything else is final.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` (given the 1-based attempt number) until it succeeds,
/// fails permanently, or attempts run out.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(attempt, error = %error, "Permanent failure, not retrying");
                return RetryResult::PermanentFailure { error, attempts: attempt };
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(attempt, error = %error, "Retries exhausted");
                return RetryResult::Exhausted { error, attempts: attempt };
            }
            Err(error) => {
                let delay = config.delay_before_retry(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig::publishing(max_retries, Duration::from_millis(5), 2.0)
    }

    #[test]
    fn test_publishing_profile() {
        let config = RetryConfig::publishing(3, Duration::from_millis(1000), 1.5);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.multiplier, MIN_MULTIPLIER);
        assert_eq!(config.delay_before_retry(1), Duration::from_millis(1000));
        assert_eq!(config.delay_before_retry(2), Duration::from_millis(2000));
        assert_eq!(config.delay_before_retry(3), Duration::from_millis(4000));
        assert_eq!(config.delay_before_retry(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_on_transient(&fast(3), |_attempt| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("delivered")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result = retry_on_transient(&fast(2), |_attempt| async {
            Err::<(), _>(TestError { transient: true })
        })
        .await;

        assert!(matches!(result, RetryResult::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_on_transient(&fast(5), |_attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError { transient: false }) }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentFailure { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
