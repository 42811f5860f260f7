use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upstream request budgets, one per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_second: 2,
            per_minute: 60,
            per_hour: 1000,
        }
    }
}

/// Rate limiter that admits a request only when every window has budget.
#[derive(Clone)]
pub struct MultiWindowLimiter {
    windows: Arc<[DirectRateLimiter; 3]>,
    limits: RateLimits,
}

impl std::fmt::Debug for MultiWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiWindowLimiter")
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for MultiWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}

impl MultiWindowLimiter {
    /// Zero budgets are clamped to one request per window.
    pub fn new(limits: RateLimits) -> Self {
        Self {
            windows: Arc::new([
                RateLimiter::direct(Quota::per_second(non_zero(limits.per_second))),
                RateLimiter::direct(Quota::per_minute(non_zero(limits.per_minute))),
                RateLimiter::direct(Quota::per_hour(non_zero(limits.per_hour))),
            ]),
            limits,
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Wait until every window admits one more request.
    pub async fn acquire(&self) {
        for window in self.windows.iter() {
            window.until_ready().await;
        }
    }

    /// Try to take budget without waiting; on refusal returns the refusing window's
    /// replenish interval as a retry hint.
    ///
    /// Budget already taken from faster windows is not returned when a slower one refuses.
    pub fn check(&self) -> Result<(), Duration> {
        let intervals = [
            replenish_interval(Duration::from_secs(1), self.limits.per_second),
            replenish_interval(Duration::from_secs(60), self.limits.per_minute),
            replenish_interval(Duration::from_secs(3600), self.limits.per_hour),
        ];
        for (window, interval) in self.windows.iter().zip(intervals) {
            if window.check().is_err() {
                return Err(interval);
            }
        }
        Ok(())
    }
}

fn replenish_interval(window: Duration, limit: u32) -> Duration {
    window / limit.max(1)
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}
