//! Timeout and retry envelope wrapped around every outbound provider call

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::ProviderKind;
use crate::config::RetryConfig;
use crate::error::ProviderError;

/// Hard per-call timeout plus exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wall-clock bound for a single call
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }

    /// Run `call` under the envelope.
    ///
    /// Every attempt is cancelled once `timeout` elapses. Only transient
    /// failures are retried; anything else is returned as-is on first sight.
    /// An exhausted budget yields [`ProviderError::Unavailable`].
    pub async fn run<T, F, Fut>(
        &self,
        provider: ProviderKind,
        operation: &str,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transient() {
                debug!(
                    provider = %provider,
                    operation = operation,
                    attempt = attempt,
                    error = %error,
                    "Non-retriable provider error"
                );
                return Err(error);
            }

            if attempt > self.max_retries {
                warn!(
                    provider = %provider,
                    operation = operation,
                    attempts = attempt,
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(ProviderError::Unavailable {
                    provider,
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.backoff_for(attempt - 1);
            debug!(
                provider = %provider,
                operation = operation,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient provider error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
