//! Exponential backoff for transient backend failures.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the attempts run out.
    ///
    /// Each attempt runs on the blocking pool, since backends hold locks and may wait on
    /// the database.
    pub async fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = op();
                (op, outcome)
            })
            .await
            .map_err(|e| Error::Storage(format!("{operation} worker failed: {e}")))?;
            op = returned;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            operation,
                            attempts = attempt,
                            error = %e,
                            "giving up after transient failures"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
