//! Per-destination rate limiting for outbound calls.
//!
//! A token bucket applied inside the activity immediately before the
//! outbound request. One limiter per destination (chat, tracker); workers
//! sharing a process share the bucket.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token-bucket limiter for one outbound destination.
pub struct DestinationLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl DestinationLimiter {
    /// Creates a limiter allowing `requests_per_minute` sustained calls.
    #[must_use]
    pub fn per_minute(requests_per_minute: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        }
    }

    /// Waits until a token is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Attempts to take a token without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for DestinationLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationLimiter").finish_non_exhaustive()
    }
}
