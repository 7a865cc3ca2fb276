//! Rate limiting utilities

use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

use crate::game::constants::MAX_MSG_RATE;

/// Per-connection message token bucket.
///
/// Capacity and refill rate are both `per_second`; tokens trickle back
/// continuously based on time elapsed since the bucket was last touched.
pub struct MessageLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
}

impl MessageLimiter<DefaultClock> {
    pub fn new(per_second: u32) -> Self {
        Self::with_clock(per_second, &DefaultClock::default())
    }
}

impl<C: Clock> MessageLimiter<C> {
    pub fn with_clock(per_second: u32, clock: &C) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(rate);
        Self {
            limiter: RateLimiter::direct_with_clock(quota, clock),
        }
    }

    /// Consume one token if available (returns true if allowed)
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for MessageLimiter<DefaultClock> {
    fn default() -> Self {
        Self::new(MAX_MSG_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::time::Duration;

    #[test]
    fn burst_of_fifty_one_drops_the_last() {
        let clock = FakeRelativeClock::default();
        let limiter = MessageLimiter::with_clock(50, &clock);

        let results: Vec<bool> = (0..51).map(|_| limiter.try_acquire()).collect();
        assert!(results[..50].iter().all(|ok| *ok));
        assert!(!results[50]);
    }

    #[test]
    fn tokens_refill_continuously() {
        let clock = FakeRelativeClock::default();
        let limiter = MessageLimiter::with_clock(50, &clock);
        for _ in 0..50 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // One token every 20 ms
        clock.advance(Duration::from_millis(20));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_secs(1));
        for _ in 0..50 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }
}
