use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// governor clock driven by tokio's timer, so paused-time tests see the same
/// instants the limiter does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        Instant::now().into_std()
    }
}

type DirectLimiter = governor::RateLimiter<
    NotKeyed,
    InMemoryState,
    TokioClock,
    NoOpMiddleware<std::time::Instant>,
>;

/// Global pacing for live fetches against the marketplace: one permit per
/// `min_interval`, no burst. Callers that are refused sleep until the next cell
/// plus a random jitter and try again, so concurrent callers queue.
pub struct RateLimiter {
    limiter: Option<DirectLimiter>,
    clock: TokioClock,
    jitter: Jitter,
}

impl RateLimiter {
    /// A zero `min_interval` disables pacing.
    pub fn new(min_interval: Duration, max_jitter: Duration) -> Self {
        let clock = TokioClock;
        let limiter = Quota::with_period(min_interval)
            .map(|quota| DirectLimiter::direct_with_clock(quota.allow_burst(NonZeroU32::MIN), &clock));
        Self {
            limiter,
            clock,
            jitter: Jitter::up_to(max_jitter),
        }
    }

    /// Wait until a request may be issued. Returns how long the caller slept.
    pub async fn acquire(&self) -> Duration {
        let Some(limiter) = &self.limiter else {
            return Duration::ZERO;
        };

        let started = Instant::now();
        while let Err(not_until) = limiter.check() {
            let wait = self.jitter + not_until.wait_time_from(self.clock.now());
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit: waiting before live fetch");
            sleep(wait).await;
        }
        started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(2500), Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_requests_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(2500), Duration::from_millis(500));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2500), "elapsed={elapsed:?}");
        assert!(elapsed <= Duration::from_millis(3000), "elapsed={elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_after_interval_has_passed() {
        let limiter = RateLimiter::new(Duration::from_secs(2), Duration::ZERO);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_pacing() {
        let limiter = RateLimiter::new(Duration::ZERO, Duration::from_millis(500));
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialize() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1), Duration::ZERO));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
