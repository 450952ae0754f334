use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::core::TokenBucket;
use crate::data::RefillPolicy;

/// How often the limiter wakes up to check the clock and the terminated flag.
pub const TICK: Duration = Duration::from_millis(50);

/// Refill cadence.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Background task that refills a [`TokenBucket`] once per second.
///
/// The first window is credited as soon as the task starts so fetchers do not
/// sit idle for the first second. The task exits at the first tick after the
/// bucket is terminated.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<TokenBucket>,
    bytes_per_second: u64,
    policy: RefillPolicy,
}

impl RateLimiter {
    pub fn new(bucket: Arc<TokenBucket>, bytes_per_second: u64, policy: RefillPolicy) -> Self {
        Self {
            bucket,
            bytes_per_second,
            policy,
        }
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Run until the bucket is terminated. Returns the number of refills.
    pub async fn run(self) -> u64 {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.refill();
        let mut refills = 1;
        let mut window_start = Instant::now();

        loop {
            ticker.tick().await;
            if self.bucket.terminated() {
                break;
            }
            if window_start.elapsed() >= WINDOW {
                window_start += WINDOW;
                self.refill();
                refills += 1;
            }
        }

        debug!(refills, "rate limiter stopped");
        refills
    }

    fn refill(&self) {
        match self.policy {
            RefillPolicy::Accumulate => self.bucket.add(self.bytes_per_second),
            RefillPolicy::Reset => self.bucket.set(self.bytes_per_second),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn accumulate_adds_ceiling_every_second() {
        let bucket = Arc::new(TokenBucket::new(0));
        let limiter = RateLimiter::new(Arc::clone(&bucket), 1000, RefillPolicy::Accumulate).spawn();

        sleep(Duration::from_millis(10)).await;
        assert_eq!(bucket.available(), 1000);

        sleep(Duration::from_millis(1015)).await;
        assert_eq!(bucket.available(), 2000);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(bucket.available(), 4000);

        bucket.terminate();
        assert_eq!(limiter.await.unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_caps_at_ceiling() {
        let bucket = Arc::new(TokenBucket::new(0));
        let limiter = RateLimiter::new(Arc::clone(&bucket), 1000, RefillPolicy::Reset).spawn();

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(bucket.available(), 1000);

        assert!(bucket.try_take(600));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(bucket.available(), 1000);

        bucket.terminate();
        limiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn starved_taker_is_released_by_the_next_window() {
        let bucket = Arc::new(TokenBucket::new(0));
        let limiter = RateLimiter::new(Arc::clone(&bucket), 4096, RefillPolicy::Accumulate).spawn();

        let started = Instant::now();
        bucket.take(4096).await;
        bucket.take(4096).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= WINDOW, "second chunk came after {elapsed:?}");
        assert!(elapsed < WINDOW + 2 * TICK);

        bucket.terminate();
        limiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_terminate() {
        let bucket = Arc::new(TokenBucket::new(0));
        let limiter = RateLimiter::new(Arc::clone(&bucket), 10, RefillPolicy::Accumulate).spawn();

        bucket.terminate();
        assert_eq!(limiter.await.unwrap(), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(bucket.available(), 10);
    }
}
