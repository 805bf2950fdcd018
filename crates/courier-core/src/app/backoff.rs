//! Retry policy: decides backoff delays between failed sweeps.

use std::time::Duration;

use rand::Rng;

/// Backoff for rescheduling a sweep that left failures behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay (before jitter).
    pub max_delay: Duration,

    /// Relative jitter, 0.1 = ±10%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5 * 60 * 60),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay for the given retry (1-indexed).
    ///
    /// delay = min(base_delay * multiplier^(retry - 1), max_delay)
    ///
    /// With base_delay=30s, multiplier=2.0:
    /// - retry 1: 30s
    /// - retry 2: 60s
    /// - retry 3: 120s
    pub fn next_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// `next_delay` spread randomly by ±`jitter` so parallel jobs drift apart.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let delay = self.next_delay(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = self.jitter.min(1.0);
        let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
    }
}
