//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Retry policy for transport failures.
///
/// There is no attempt cap: a task is retried until the downstream answers.
/// With `multiplier = 1.0` every retry waits exactly `base_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first re-attempt.
    pub base_delay: Duration,

    /// Growth factor per further retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Fixed delay, no growth.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Delay before re-enqueueing a task that has now failed `retries` times.
    ///
    /// delay = base_delay * multiplier^(retries - 1); `retries = 0` counts as 1.
    /// The result saturates at one day.
    pub fn next_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if delay_secs.is_nan() || delay_secs < 0.0 {
            return self.base_delay;
        }
        Duration::from_secs_f64(delay_secs.min(MAX_DELAY_SECS))
    }
}

const MAX_DELAY_SECS: f64 = 24.0 * 60.0 * 60.0;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}
