//! Bounded directory queries.
//!
//! Every per-object query (token groups, security descriptors) runs under a
//! per-attempt timeout, and transient failures are retried with capped
//! exponential backoff. One unreachable object therefore costs at most
//! `(max_retries + 1) * attempt_timeout` plus backoff, never a stalled run.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{DirectoryError, DirectoryResult};

/// Timeout and backoff settings for directory queries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each backoff by a random 0-25% so parallel workers that
    /// failed together do not retry together.
    pub jitter: bool,
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs directory queries under a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff before retry number `retry` (0 is the first retry).
    fn backoff(&self, retry: u32) -> Duration {
        let growth = self
            .config
            .backoff_multiplier
            .powi(retry.min(i32::MAX as u32) as i32);
        let uncapped = self.config.initial_delay.as_secs_f64() * growth;
        let capped = uncapped.min(self.config.max_delay.as_secs_f64());

        let stretched = if self.config.jitter {
            capped * rand::thread_rng().gen_range(1.0..1.25)
        } else {
            capped
        };
        Duration::from_millis((stretched * 1000.0).round() as u64)
    }

    /// Run `query` until it succeeds, fails permanently, or the retry budget
    /// is spent.
    ///
    /// A timed-out attempt counts as a transient failure. Exhausting the
    /// budget yields [`DirectoryError::MaxRetriesExceeded`] carrying the last
    /// error.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut query: F) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match tokio::time::timeout(self.config.attempt_timeout, query()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_permanent() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => DirectoryError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.config.attempt_timeout.as_millis() as u64,
                },
            };

            if retry >= self.config.max_retries {
                warn!(
                    operation,
                    attempts = retry + 1,
                    error = %err,
                    "Directory query abandoned"
                );
                return Err(DirectoryError::MaxRetriesExceeded {
                    operation: operation.to_string(),
                    max_retries: self.config.max_retries,
                    last_error: err.to_string(),
                });
            }

            let delay = self.backoff(retry);
            retry += 1;
            debug!(
                operation,
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Directory query failed transiently, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
