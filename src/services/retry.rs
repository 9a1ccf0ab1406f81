//! Bounded, classified retry for provider calls.
//!
//! Backoff doubles with each retry (2s -> 4s -> 8s with the defaults), capped at
//! `max_backoff`. Every attempt runs under `call_timeout`; a timeout is a
//! transient failure. Terminal errors are returned on the first occurrence.
//! Calls that are not safe to repeat stop at the first ambiguous failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::RetryConfig;

/// Attempt budget, backoff curve and per-call timeout for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff,
            config.max_backoff,
            config.call_timeout,
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            call_timeout,
        }
    }

    /// No waiting between attempts; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            Duration::ZERO,
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }

    /// Total attempts, including the first.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails terminally, or the attempt
    /// budget is spent. The last error is returned on exhaustion.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.run(operation_name, operation, true).await
    }

    /// Like [`execute`](Self::execute), but an ambiguous failure (the call
    /// may have taken effect) is returned without another attempt.
    pub async fn execute_non_idempotent<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.run(operation_name, operation, false).await
    }

    async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
        retry_ambiguous: bool,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match timeout(self.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "{operation_name} exceeded {}ms",
                    self.call_timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_terminal() => {
                    debug!(operation = operation_name, error = %err, "terminal error, not retrying");
                    return Err(err);
                }
                Err(err) if !retry_ambiguous && err.is_ambiguous() => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "call may have taken effect, not retrying"
                    );
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "retry budget exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let backoff = self.calculate_backoff(attempt - 1);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient provider error, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Formula: min(initial_backoff * 2^retry, max_backoff)
    fn calculate_backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(retry))
            .min(self.max_backoff)
    }
}
