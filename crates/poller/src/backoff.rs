//! Back-off policy for failed ticks.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`. With
//! the default `factor = 1.0` every failed tick waits the same fixed delay.

use std::time::Duration;

/// Retry back-off policy
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub first: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Multiplicative growth per consecutive failure
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// `first = 60s`, `factor = 1.0`, `max = 10min`
    fn default() -> Self {
        Self {
            first: Duration::from_secs(60),
            max: Duration::from_secs(600),
            factor: 1.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` consecutive failures (0-indexed)
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
