use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound of random delay added to each backoff
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    fn backoff_with_jitter(&self, retry: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.backoff(retry) + Duration::from_millis(jitter)
    }
}

/// Run one attempt under a deadline; a missed deadline is an execution failure
pub async fn with_timeout<T, Fut>(
    operation: &'static str,
    after: Duration,
    attempt: Fut,
) -> std::result::Result<crate::Result<T>, EngineError>
where
    Fut: Future<Output = crate::Result<T>>,
{
    tokio::time::timeout(after, attempt)
        .await
        .map_err(|_| EngineError::Timeout { operation, after })
}

/// Retry `attempt` until it succeeds or `policy.max_attempts` is used up.
///
/// Each attempt is bounded by `timeout`. Errors and timeouts both count as a
/// failed attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    operation: &'static str,
    timeout: Duration,
    mut attempt: F,
) -> std::result::Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for n in 1..=max_attempts {
        match with_timeout(operation, timeout, attempt()).await {
            Ok(Ok(value)) => {
                if n > 1 {
                    tracing::info!(operation, attempts = n, "Succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(e) => last_error = e.to_string(),
        }

        if n < max_attempts {
            let delay = policy.backoff_with_jitter(n);
            tracing::warn!(
                operation,
                attempt = n,
                max_attempts,
                error = %last_error,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    tracing::error!(operation, attempts = max_attempts, error = %last_error, "Retries exhausted");

    Err(EngineError::RetriesExhausted {
        operation,
        attempts: max_attempts,
        last_error,
    })
}
