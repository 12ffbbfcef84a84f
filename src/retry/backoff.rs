use rand::Rng;
use std::time::Duration;
use tracing::trace;

use super::RetryConfig;

/// Trait defining backoff behavior
pub trait Backoff: Send + Sync {
    /// Calculate the delay before the given retry attempt (1-based)
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
            ..Self::new(config.initial_backoff, config.max_backoff)
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let exp_delay = base * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let max_ms = self.max_delay.as_millis() as f64;

        // Cap before jitter, and again after, so max_delay is a hard ceiling
        let capped_delay = exp_delay.min(max_ms);
        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_delay = (capped_delay + jitter).clamp(0.0, max_ms);

        trace!(
            attempt = attempt,
            base_delay_ms = capped_delay,
            jitter_ms = jitter,
            final_delay_ms = final_delay,
            "Calculated backoff delay"
        );

        Duration::from_millis(final_delay as u64)
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }
}
