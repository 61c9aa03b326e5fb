//! Aggregate rate limiting shared by every worker of a run.
//!
//! [`RateLimiter`] is a token bucket. It holds at most `capacity` tokens, starts full
//! and refills continuously at `rate` tokens per second. A worker calls
//! [`RateLimiter::acquire`] before each invocation.
//!
//! # Reservation model
//! Instead of a background governor adding permits on a tick, the bucket is refilled
//! lazily whenever someone acquires:
//!
//! ```text
//! tokens = min(capacity, tokens + rate * elapsed_seconds)
//! tokens = tokens - n
//! wait   = max(0, -tokens) / rate
//! ```
//!
//! The caller takes its tokens immediately (the balance may go negative) and then
//! sleeps for `wait`. Later callers see the debt and wait correspondingly longer, so
//! the admitted rate never exceeds `rate` plus the initial burst, at any rate and with
//! any number of workers. The lock is only held for the arithmetic, never across a
//! sleep.
//!
//! Fractional tokens are carried across acquisitions so low rates (for example 0.5
//! ops/sec) keep their long-term average.
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket capping the combined call rate of all workers.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: u64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl RateLimiter {
    /// Create a full bucket refilling at `rate` tokens per second.
    ///
    /// `rate` must be positive and finite and `capacity` non-zero; the coordinator
    /// validates both before constructing a limiter.
    pub fn new(rate: f64, capacity: u64) -> Self {
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                updated: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Wait until `n` tokens are available and take them.
    pub async fn acquire(&self, n: u64) {
        if n == 0 {
            return;
        }
        let wait = self.reserve(n, Instant::now());
        if !wait.is_zero() {
            tracing::trace!(?wait, "Waiting for rate limiter tokens.");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take `n` tokens as of `now` and return how long the caller has to wait
    /// before using them.
    fn reserve(&self, n: u64, now: Instant) -> Duration {
        // The bucket is plain data, so a poisoned lock still holds a usable balance.
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(bucket.updated);
        bucket.tokens = refill(bucket.tokens, elapsed, self.rate, self.capacity);
        bucket.updated = now;
        bucket.tokens -= n as f64;
        wait_for_debt(bucket.tokens, self.rate)
    }
}

/// Pure function computing the bucket balance after `elapsed` of refilling.
///
/// The result never exceeds `capacity`; a negative balance (outstanding
/// reservations) is paid back before any surplus accumulates.
pub(crate) fn refill(tokens: f64, elapsed: Duration, rate: f64, capacity: u64) -> f64 {
    let refilled = tokens + rate * elapsed.as_secs_f64();
    refilled.min(capacity as f64)
}

/// How long it takes for a balance of `tokens` to climb back to zero.
pub(crate) fn wait_for_debt(tokens: f64, rate: f64) -> Duration {
    if tokens >= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(-tokens / rate).unwrap_or(Duration::MAX)
}
