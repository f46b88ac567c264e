use flowcore::FlowError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            backoff: Backoff::Fixed,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 1-based attempt failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay_ms = match self.backoff {
            Backoff::Fixed => self.delay_ms,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(10);
                self.delay_ms.saturating_mul(1u64 << exponent)
            }
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are exhausted. The last error is returned unchanged.
    ///
    /// Cancellation interrupts the wait between attempts and yields `Canceled`.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut f: F,
    ) -> Result<T, FlowError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FlowError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FlowError::Canceled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
