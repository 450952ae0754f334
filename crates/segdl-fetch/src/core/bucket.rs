//! Byte-token bucket shared by the fetchers and the rate limiter.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct State {
    tokens: u64,
    terminated: bool,
}

/// Thread-safe count of available byte-tokens plus a terminated flag.
///
/// Fetchers withdraw with [`take`](Self::take) before transferring a chunk; the
/// rate limiter refills with [`add`](Self::add) or [`set`](Self::set). Waiting
/// takers are parked on a [`Notify`] and woken by every refill, so nobody
/// polls.
///
/// [`terminate`](Self::terminate) only tells the refill loop to exit. A `take`
/// issued after termination is never woken unless someone still refills the
/// bucket, so all fetchers must be joined before the bucket is terminated.
#[derive(Debug, Default)]
pub struct TokenBucket {
    state: Mutex<State>,
    notify: Notify,
}

impl TokenBucket {
    pub fn new(tokens: u64) -> Self {
        Self {
            state: Mutex::new(State {
                tokens,
                terminated: false,
            }),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until at least `n` tokens are available, then withdraw them.
    ///
    /// No fairness between concurrent takers.
    pub async fn take(&self, n: u64) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a refill between the check and the
            // await is not missed.
            notified.as_mut().enable();

            if self.try_take(n) {
                return;
            }
            notified.await;
        }
    }

    /// Withdraw `n` tokens if they are available right now.
    pub fn try_take(&self, n: u64) -> bool {
        let mut state = self.state();
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Deposit `n` tokens and wake every waiting taker.
    pub fn add(&self, n: u64) {
        {
            let mut state = self.state();
            state.tokens = state.tokens.saturating_add(n);
        }
        self.notify.notify_waiters();
    }

    /// Replace the balance with exactly `n` tokens, forfeiting any leftover.
    pub fn set(&self, n: u64) {
        self.state().tokens = n;
        self.notify.notify_waiters();
    }

    pub fn available(&self) -> u64 {
        self.state().tokens
    }

    pub fn terminate(&self) {
        self.state().terminated = true;
    }

    pub fn terminated(&self) -> bool {
        self.state().terminated
    }
}
