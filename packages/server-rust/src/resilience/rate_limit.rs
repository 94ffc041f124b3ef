//! Token-bucket admission gate backed by `governor`.
//!
//! The bucket starts full, refills at `rate_per_second` and never holds more
//! than `burst` cells. `admit()` never waits: it either takes a cell or
//! reports that the caller must reject the request.

use std::num::NonZeroU32;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

use crate::config::RateLimitConfig;

/// A `RateLimitConfig` that cannot back a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRateLimit {
    #[error("rate_per_second must be at least 1")]
    ZeroRate,
    #[error("burst must be at least 1")]
    ZeroBurst,
}

/// Governor clock reading tokio's time source, so a paused test runtime
/// drives refills the same way it drives sleeps.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    tokio_origin: tokio::time::Instant,
    std_origin: std::time::Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            tokio_origin: tokio::time::Instant::now(),
            std_origin: std::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        self.std_origin + self.tokio_origin.elapsed()
    }
}

type DirectLimiter<C> =
    governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Token bucket shared by every request handler of a service instance.
pub struct RateLimiter<C: Clock = TokioClock> {
    rate_per_second: NonZeroU32,
    burst: NonZeroU32,
    inner: DirectLimiter<C>,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate_per_second", &self.rate_per_second)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a full bucket on the tokio clock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRateLimit` if the rate or the burst is zero.
    pub fn new(config: RateLimitConfig) -> Result<Self, InvalidRateLimit> {
        Self::with_clock(config, &TokioClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Creates a full bucket refilled according to `clock`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRateLimit` if the rate or the burst is zero.
    pub fn with_clock(config: RateLimitConfig, clock: &C) -> Result<Self, InvalidRateLimit> {
        let rate_per_second =
            NonZeroU32::new(config.rate_per_second).ok_or(InvalidRateLimit::ZeroRate)?;
        let burst = NonZeroU32::new(config.burst).ok_or(InvalidRateLimit::ZeroBurst)?;
        let quota = Quota::per_second(rate_per_second).allow_burst(burst);
        Ok(Self {
            rate_per_second,
            burst,
            inner: governor::RateLimiter::direct_with_clock(quota, clock),
        })
    }

    /// Takes one cell if available.
    #[must_use]
    pub fn admit(&self) -> bool {
        self.inner.check().is_ok()
    }

    #[must_use]
    pub fn rate_per_second(&self) -> u32 {
        self.rate_per_second.get()
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}
