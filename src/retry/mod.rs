//! Retry and backoff for throttled Kinesis calls

mod backoff;

pub use backoff::{Backoff, ExponentialBackoff};

use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            jitter_factor: 0.1,
        }
    }
}

/// Helper for retrying operations with backoff
pub struct RetryHandle<B: Backoff> {
    config: RetryConfig,
    backoff: B,
    attempts: u32,
}

impl RetryHandle<ExponentialBackoff> {
    pub fn from_config(config: RetryConfig) -> Self {
        let backoff = ExponentialBackoff::from_config(&config);
        Self::new(config, backoff)
    }
}

impl<B: Backoff> RetryHandle<B> {
    pub fn new(config: RetryConfig, backoff: B) -> Self {
        Self {
            config,
            backoff,
            attempts: 0,
        }
    }

    /// Run `operation`, retrying with backoff while `is_retryable` accepts the error.
    ///
    /// Non-retryable errors and the error of the last allowed attempt are
    /// returned unchanged.
    pub async fn retry<F, Fut, T, E, P>(&mut self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        loop {
            self.attempts += 1;
            trace!(attempt = self.attempts, "Executing operation");

            match operation().await {
                Ok(value) => {
                    if self.attempts > 1 {
                        debug!(attempts = self.attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let retries_used = self.attempts - 1;
                    if !is_retryable(&e) || retries_used >= self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.backoff.next_delay(self.attempts);
                    warn!(
                        attempt = self.attempts,
                        delay_ms = ?delay.as_millis(),
                        error = %e,
                        "Operation failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Get the current attempt count
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
