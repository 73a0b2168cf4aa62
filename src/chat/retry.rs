//! Exponential backoff for transient request failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::chat::config::ChatConfig;
use crate::chat::error::ChatResult;

/// Retry schedule: one initial attempt plus `max_retries`, with doubling delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy described by a client config.
    #[must_use]
    pub const fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` (0-based): `base_delay * 2^retry`, saturating.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation`, retrying transient failures until the retries run out.
    ///
    /// Non-retryable errors are returned immediately; after the last retry the
    /// final error is returned as-is.
    ///
    /// # Errors
    /// Returns the last error produced by `operation`.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> ChatResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ChatResult<T>> + Send,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.max_retries && err.is_retryable() => {
                    let delay = self.backoff(retry);
                    retry += 1;
                    warn!(
                        attempt = retry,
                        retries_left = self.max_retries - retry,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = ?err,
                        "Retrying chat request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
