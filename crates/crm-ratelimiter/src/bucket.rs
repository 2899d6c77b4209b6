//! Token bucket state machine.
//!
//! Capacity is the burst size; tokens refill continuously at the current
//! rate (tokens/minute). This is the sole gate for outbound remote calls
//! — no component may bypass it.

use std::time::{Duration, Instant};

/// Pure token-bucket state. Not thread-safe on its own; [`crate::limiter::RateLimiter`]
/// wraps this in a mutex for shared use across workers.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Current refill rate, in tokens per second (stored as per-second for
    /// precision; configured and reported in tokens/minute).
    rate_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(capacity: usize, rate_per_minute: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            rate_per_sec: rate_per_minute / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Attempts to take one token. On success returns `Ok(Duration::ZERO)`.
    /// On failure returns `Err(wait)` with the estimated wait until a
    /// token becomes available.
    pub(crate) fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_secs = if self.rate_per_sec > 0.0 {
                deficit / self.rate_per_sec
            } else {
                f64::INFINITY
            };
            Err(Duration::from_secs_f64(wait_secs))
        }
    }

    pub(crate) fn set_rate_per_minute(&mut self, rate_per_minute: f64) {
        // Refill with the old rate up to now before switching, so the
        // adjustment takes effect going forward rather than retroactively.
        self.refill(Instant::now());
        self.rate_per_sec = rate_per_minute / 60.0;
    }

    pub(crate) fn rate_per_minute(&self) -> f64 {
        self.rate_per_sec * 60.0
    }

    pub(crate) fn available_tokens(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn starts_full() {
        let mut bucket = TokenBucket::new(20, 200.0);
        assert!((bucket.available_tokens() - 20.0).abs() < 0.001);
    }

    #[test]
    fn acquiring_drains_tokens() {
        let mut bucket = TokenBucket::new(2, 60.0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn refills_over_time() {
        // 600 tokens/min = 10/sec, so after 110ms we expect just over 1 token back.
        let mut bucket = TokenBucket::new(1, 600.0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());

        sleep(Duration::from_millis(110));
        assert!(bucket.try_acquire().is_ok());
    }

    #[test]
    fn rate_change_takes_effect() {
        let mut bucket = TokenBucket::new(5, 60.0);
        assert_eq!(bucket.rate_per_minute(), 60.0);
        bucket.set_rate_per_minute(120.0);
        assert_eq!(bucket.rate_per_minute(), 120.0);
    }

    #[test]
    fn capacity_caps_refill() {
        let mut bucket = TokenBucket::new(3, 6000.0);
        sleep(Duration::from_millis(50));
        assert!(bucket.available_tokens() <= 3.0);
    }
}
