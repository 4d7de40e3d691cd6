//! Retry and timeout helpers for orchestration steps
//!
//! Connection establishment may be retried with exponential backoff when the
//! failure is transient; every other step is attempted once but bounded by a
//! timeout so a stuck collaborator cannot stall initialization or teardown.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::duration_ms;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Configuration for retry behavior
///
/// # Examples
///
/// ```rust
/// use rtc_orchestrator_core::recovery::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_delay, Duration::from_millis(100));
///
/// // Orchestrator default: connect once, never retry
/// assert_eq!(RetryConfig::none().max_attempts, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt with no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Short delays and more attempts, for flaky networks
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Deterministic delays, mostly useful in tests
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next_delay_ms = (delay.as_millis() as f64 * self.backoff_multiplier) as u64;
        Duration::from_millis(next_delay_ms).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.use_jitter {
            return delay;
        }
        let jitter = (rand::random::<f64>() - 0.5) * 0.2; // ±10%
        let millis = delay.as_millis() as f64;
        Duration::from_millis((millis * (1.0 + jitter)) as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// Only errors for which [`OrchestratorError::is_recoverable`] returns `true`
/// are retried. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> OrchestratorResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = OrchestratorResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );

                sleep(config.jittered(delay)).await;
                delay = config.next_delay(delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts && config.max_attempts > 1 {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                } else {
                    debug!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "Operation failed, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Bound `future` by `timeout`, mapping expiry to [`OrchestratorError::OperationTimeout`]
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> OrchestratorResult<T>
where
    F: Future<Output = OrchestratorResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(OrchestratorError::OperationTimeout {
                operation: operation_name.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_with_backoff_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_with_backoff("connect", &RetryConfig::fixed(3, Duration::from_millis(1)), |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(OrchestratorError::connection(ProviderError::transient("reset")))
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: OrchestratorResult<()> =
            retry_with_backoff("connect", &RetryConfig::fixed(5, Duration::from_millis(1)), |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OrchestratorError::connection(ProviderError::new("auth")))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().provider_error().unwrap().message, "auth");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let result: OrchestratorResult<()> =
            retry_with_backoff("connect", &RetryConfig::fixed(2, Duration::from_millis(1)), |attempt| async move {
                Err(OrchestratorError::connection(ProviderError::transient(format!("attempt {}", attempt))))
            })
            .await;

        assert_eq!(result.unwrap_err().provider_error().unwrap().message, "attempt 2");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: OrchestratorResult<()> = with_timeout("join", Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(OrchestratorError::OperationTimeout { operation, duration_ms }) => {
                assert_eq!(operation, "join");
                assert_eq!(duration_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(300),
            ..RetryConfig::default()
        };
        assert_eq!(config.next_delay(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(config.next_delay(Duration::from_millis(200)), Duration::from_millis(300));
    }
}
