//! Retry Logic with Exponential Backoff
//!
//! Wraps chain RPC calls in a bounded retry policy.
//! Only retries errors that are classified as retryable by ChainError.

use super::chain_errors::ChainError;
use crate::logging::TxLog;
use alloy::primitives::Address;
use std::future::Future;
use tokio::time::{sleep, Duration};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds; doubles every attempt
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    /// Delay applied after failed attempt `attempt` (0-indexed): base * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Execute an async closure with retry logic.
///
/// The closure should return `Result<T, ChainError>`.
/// Only retries if `ChainError::is_retryable()` returns true; any other error,
/// or the last one once attempts run out, is returned exactly as produced.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    log: &dyn TxLog,
    wallet: Option<Address>,
    operation_name: &str,
    mut f: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt + 1 >= max_attempts {
                    log.warn(
                        wallet,
                        &format!(
                            "[Retry] {} failed after {} attempts: {}",
                            operation_name, max_attempts, err
                        ),
                    );
                    return Err(err);
                }

                let delay = config.backoff(attempt);
                log.warn(
                    wallet,
                    &format!(
                        "[Retry] {} attempt {}/{} failed ({}), retrying in {}ms",
                        operation_name,
                        attempt + 1,
                        max_attempts,
                        err,
                        delay.as_millis()
                    ),
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Severity;
    use crate::test_utils::RecordingLog;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(2000));
        assert_eq!(config.backoff(1), Duration::from_millis(4000));
        assert_eq!(config.backoff(2), Duration::from_millis(8000));
        assert_eq!(config.backoff(3), Duration::from_millis(16000));
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let log = RecordingLog::default();
        let result = with_retry(&config, &log, None, "test", || async { Ok::<_, ChainError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(log.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rate_limited_then_succeeds() {
        let config = RetryConfig::default();
        let log = RecordingLog::default();
        let start = Instant::now();
        let calls: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let result = with_retry(&config, &log, Some(Address::ZERO), "allowance", || {
            let mut seen = calls_clone.lock().unwrap();
            seen.push(start.elapsed());
            let count = seen.len();
            async move {
                if count < 3 {
                    Err(ChainError::RateLimited("429 Too Many Requests".to_string()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_close(calls[1] - calls[0], Duration::from_millis(2000));
        assert_close(calls[2] - calls[1], Duration::from_millis(4000));
        assert_eq!(log.count(Severity::Warn), 2);
        assert!(log.messages()[0].contains("attempt 1/5"));
        assert!(log.messages()[1].contains("4000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_non_retryable_fails_immediately() {
        let config = RetryConfig::default();
        let log = RecordingLog::default();
        let start = Instant::now();

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, &log, None, "test", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ChainError::Reverted("insufficient balance".to_string())) }
        })
        .await;

        assert_eq!(result, Err(ChainError::Reverted("insufficient balance".to_string())));
        assert_eq!(counter.load(Ordering::SeqCst), 1); // Only tried once
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(log.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_returns_original_error() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 2000,
        };
        let log = RecordingLog::default();
        let start = Instant::now();

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, &log, None, "test", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ChainError::Connection("connection reset".to_string())) }
        })
        .await;

        assert_eq!(result, Err(ChainError::Connection("connection reset".to_string())));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // 2s + 4s between attempts, nothing after the last one
        assert_close(start.elapsed(), Duration::from_millis(6000));
    }
}
