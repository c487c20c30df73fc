//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Action rate limit for WebSocket messages (per connection)
pub const ACTION_RATE_LIMIT: u32 = 20; // Max 20 actions per second

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ActionRateLimiter {
    action_limiter: Arc<Limiter>,
}

impl ActionRateLimiter {
    pub fn new() -> Self {
        Self {
            action_limiter: create_limiter(ACTION_RATE_LIMIT),
        }
    }

    /// Check if an action message is allowed (returns true if allowed)
    pub fn check_action(&self) -> bool {
        self.action_limiter.check().is_ok()
    }
}

impl Default for ActionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
