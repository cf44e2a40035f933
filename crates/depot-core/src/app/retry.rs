//! Retry policy: decides backoff delays between worker relaunch attempts.

use std::time::Duration;

/// Exponential backoff: `base_delay * multiplier^(attempts - 1)`, capped at
/// `max_delay`.
///
/// With the default policy:
/// - attempt 1 (first failure): 2s
/// - attempt 2: 4s
/// - attempt 3: 8s
/// - ...
/// - attempt 6 and later: 60s
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: f64,

    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately. Used by tests.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the next retry. `attempts` is the number of failed
    /// attempts so far (1-indexed); 0 is treated as 1.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}
