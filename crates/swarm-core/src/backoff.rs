//! Retry policy with exponential backoff and additive jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff policy applied to retriable external calls.
///
/// Defaults match the pipeline contract: initial 1 s, multiplier 2.0,
/// cap 30 s, additive jitter up to 100 ms, 3 attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Multiplier applied per subsequent retry.
    pub multiplier: f64,
    /// Upper bound on the computed delay, before jitter.
    pub cap: Duration,
    /// Maximum additive jitter.
    pub max_jitter: Duration,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            max_jitter: Duration::from_millis(100),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retrying after the given failed attempt
    /// (1-indexed), or `None` when attempts are exhausted.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = Duration::from_secs_f64(base.min(self.cap.as_secs_f64()));
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_nanos = u64::try_from(self.max_jitter.as_nanos()).unwrap_or(u64::MAX);
            Duration::from_nanos(rand::thread_rng().gen_range(0..=max_nanos))
        };
        Some(capped + jitter)
    }
}
