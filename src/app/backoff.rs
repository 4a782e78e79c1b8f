//! Exponential backoff with jitter
//!
//! Used by the crawler between listing retries and by download workers between
//! content attempts. The jitter source is injected so that delays are
//! reproducible under a seeded [`fastrand::Rng`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;

/// Capped exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    /// Upper bound for any delay, jitter included
    #[serde(with = "humantime_serde")]
    pub cap: Duration,
    /// Fraction of the delay added as random jitter (0.0 disables jitter)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: workers::BACKOFF_BASE,
            cap: workers::BACKOFF_CAP,
            jitter: workers::BACKOFF_JITTER,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from base, cap and jitter fraction
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Deterministic part of the delay after `attempt` failed attempts
    ///
    /// `attempt` is 1-based: the first retry waits `base`, the next `2 * base`
    /// and so on, never exceeding `cap`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base_millis = self.base.as_millis() as u64;
        let millis = base_millis.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis).min(self.cap)
    }

    /// Delay after `attempt` failed attempts, jitter drawn from `rng`
    pub fn delay(&self, attempt: u32, rng: &mut fastrand::Rng) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }

        let jitter_range = (delay.as_millis() as f64 * self.jitter) as u64;
        let jitter = if jitter_range > 0 {
            rng.u64(0..=jitter_range)
        } else {
            0
        };

        (delay + Duration::from_millis(jitter)).min(self.cap)
    }
}
