//! Write retry policy
//!
//! Per-message sink write failures are retried according to a configured
//! policy rather than a hard-coded loop. After the policy is exhausted the
//! forwarder escalates to a connector-failed condition; a message is never
//! silently dropped.

use std::future::Future;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::error::Result;

/// Retry behavior for sink writes. Deserialized as part of the connector
/// configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct RetryPolicy {
    /// Maximum retry attempts, not counting the initial attempt
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 100))]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay_ms")]
    #[validate(range(min = 1, max = 300_000))]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each retry
    #[serde(default = "default_backoff_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) added to each delay
    #[serde(default = "default_jitter_factor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// A policy that fails immediately without retrying
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A policy with a fixed delay between retries
    pub fn fixed_delay(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before the given attempt (1-indexed; attempt 0 has no delay)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // cap the exponent to keep the backoff from overflowing
        let capped = attempt.min(30);
        let base =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(capped as i32 - 1);
        let capped_delay = base.min(self.max_delay_ms as f64);

        let jitter = if self.jitter_factor > 0.0 {
            // deterministic jitter keyed by attempt number
            let range = capped_delay * self.jitter_factor;
            let phase = (attempt as f64 * 0.618033988749895) % 1.0;
            range * (phase - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }

    /// Run an async operation, retrying retryable failures per this policy.
    ///
    /// Non-retryable errors and policy exhaustion both return the last error
    /// to the caller.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt > self.max_retries {
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying sink write: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay_ms, 100);
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert!(policy.delay_for_attempt(4) <= Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_run_succeeds_first_try() {
        let policy = RetryPolicy::default();
        let result = policy.run(|| async { Ok::<_, ConnectorError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_retries_transient_failures() {
        let policy = RetryPolicy::fixed_delay(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = policy
            .run(|| {
                let calls = calls2.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ConnectorError::write("flaky"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_policy() {
        let policy = RetryPolicy::fixed_delay(2, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<()> = policy
            .run(|| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectorError::write("down"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn test_run_does_not_retry_fatal_errors() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<()> = policy
            .run(|| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectorError::config("bad"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
