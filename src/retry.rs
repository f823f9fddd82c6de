use crate::config::EngineConfig;
use crate::error::{Result, TaskflowError};
use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff step.
const MAX_DELAY: Duration = Duration::from_millis(500);

/// How many times a unit of work is attempted when SQLite reports
/// contention, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay before attempt `attempt + 1`: exponential in the attempt
    /// number, capped, with up to 50% random jitter added.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_DELAY);

        let jitter_factor = rand::random::<f64>() * 0.5;
        backoff + backoff.mul_f64(jitter_factor)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
///
/// Every attempt must be a complete unit of work (its own transaction), so a
/// retried attempt re-reads whatever state it depends on.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, task_id: i64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if attempt >= policy.max_attempts {
                    tracing::warn!(task_id, attempts = attempt, error = %e, "Giving up after repeated contention");
                    return Err(TaskflowError::ConcurrencyConflict {
                        task_id,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    task_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Storage busy, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}
