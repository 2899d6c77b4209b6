//! The shared rate limiter.
//!
//! Wraps a [`TokenBucket`] in a `tokio::sync::Mutex` so every worker shares
//! the same budget, and drives a background task that re-evaluates the
//! success window every `adjustment_interval` and nudges the bucket's rate
//! up or down per [`adaptive::decide`]. This mirrors
//! `tower_resilience_ratelimiter::SharedRateLimiter`'s shape: a mutex-guarded
//! limiter struct plus a detached background task, rather than an actor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crm_core::{Classification, EventListeners};

use crate::adaptive::{self, OutcomeWindow};
use crate::bucket::TokenBucket;
use crate::config::RateLimiterConfig;
use crate::error::RateLimiterError;
use crate::events::RateLimiterEvent;

struct Shared {
    bucket: Mutex<TokenBucket>,
    outcomes: OutcomeWindow,
    min_rate: f64,
    max_rate: f64,
    listeners: EventListeners<RateLimiterEvent>,
}

/// The global, adaptive token-bucket rate limiter that every remote call
/// must pass through.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Builds a new limiter from `config` and starts its adjustment loop
    /// if `config.adaptive_enabled`. Returns the limiter and a handle to the
    /// background task (drop the handle to detach, or abort it to stop
    /// adjusting).
    pub fn new(config: RateLimiterConfig) -> (Self, Option<JoinHandle<()>>) {
        Self::with_listeners(config, EventListeners::new())
    }

    /// Same as [`RateLimiter::new`] but with event listeners pre-registered.
    pub fn with_listeners(
        config: RateLimiterConfig,
        listeners: EventListeners<RateLimiterEvent>,
    ) -> (Self, Option<JoinHandle<()>>) {
        let shared = Arc::new(Shared {
            bucket: Mutex::new(TokenBucket::new(config.burst, config.initial_rate_per_minute)),
            outcomes: OutcomeWindow::new(),
            min_rate: config.min_rate_per_minute,
            max_rate: config.max_rate_per_minute,
            listeners,
        });

        let limiter = Self {
            shared: Arc::clone(&shared),
        };

        let handle = if config.adaptive_enabled {
            let interval = config.adjustment_interval;
            let loop_shared = Arc::clone(&shared);
            Some(tokio::spawn(async move {
                run_adjustment_loop(loop_shared, interval).await;
            }))
        } else {
            None
        };

        (limiter, handle)
    }

    /// Blocks until a token is available or `deadline` elapses. On success,
    /// returns how long the caller actually waited. On failure, returns a
    /// retryable [`RateLimiterError::DeadlineExceeded`].
    pub async fn acquire(&self, deadline: Duration) -> Result<Duration, RateLimiterError> {
        let start = Instant::now();
        let deadline_at = start + deadline;

        loop {
            let wait = {
                let mut bucket = self.shared.bucket.lock().await;
                bucket.try_acquire()
            };

            match wait {
                Ok(()) => {
                    let waited = start.elapsed();
                    self.shared
                        .listeners
                        .emit(&RateLimiterEvent::permit_acquired(waited));
                    return Ok(waited);
                }
                Err(estimated_wait) => {
                    let now = Instant::now();
                    if now >= deadline_at {
                        self.shared
                            .listeners
                            .emit(&RateLimiterEvent::permit_rejected(deadline));
                        return Err(RateLimiterError::DeadlineExceeded { deadline });
                    }

                    let remaining = deadline_at - now;
                    let sleep_for = estimated_wait.min(remaining);
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }

    /// Feeds the outcome of a completed call into the adaptive window. Call
    /// this once per completed remote call, using the boundary
    /// classification produced by the CLI Bridge / Retry Engine.
    pub fn record_outcome(&self, classification: Classification) {
        match classification {
            Classification::Ok => self.shared.outcomes.record_success(),
            Classification::QuotaError => self.shared.outcomes.record_quota_error(),
            _ => self.shared.outcomes.record_failure(),
        }
    }

    /// Returns the current steady-state rate, in tokens/minute.
    pub async fn current_rate_per_minute(&self) -> f64 {
        self.shared.bucket.lock().await.rate_per_minute()
    }
}

async fn run_adjustment_loop(shared: Arc<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it.

    loop {
        ticker.tick().await;

        let (successes, failures, quota_errors) = shared.outcomes.take_snapshot();
        let decision = adaptive::decide(successes, failures, quota_errors);

        let mut bucket = shared.bucket.lock().await;
        let current = bucket.rate_per_minute();
        let next = match decision {
            adaptive::Adjustment::Increase => {
                (current * adaptive::INCREASE_FACTOR).min(shared.max_rate)
            }
            adaptive::Adjustment::Decrease => {
                (current * adaptive::DECREASE_FACTOR).max(shared.min_rate)
            }
            adaptive::Adjustment::Hold => current,
        };

        if (next - current).abs() > f64::EPSILON {
            bucket.set_rate_per_minute(next);
            shared
                .listeners
                .emit(&RateLimiterEvent::rate_adjusted(current, next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimiterConfigBuilder;

    #[tokio::test]
    async fn acquire_succeeds_immediately_when_tokens_available() {
        let config = RateLimiterConfigBuilder::new().burst(5).build();
        let (limiter, _handle) = RateLimiter::new(config);

        let waited = limiter.acquire(Duration::from_secs(1)).await.unwrap();
        assert!(waited < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_times_out_when_bucket_is_empty() {
        let config = RateLimiterConfigBuilder::new()
            .burst(1)
            .rate_per_minute(1.0) // effectively never refills within the test window
            .adaptive(false)
            .build();
        let (limiter, _handle) = RateLimiter::new(config);

        limiter.acquire(Duration::from_millis(50)).await.unwrap();
        let result = limiter.acquire(Duration::from_millis(20)).await;
        assert!(matches!(
            result,
            Err(RateLimiterError::DeadlineExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn adjustment_loop_increases_rate_on_clean_window() {
        let config = RateLimiterConfigBuilder::new()
            .burst(10)
            .rate_per_minute(100.0)
            .rate_bounds(10.0, 1000.0)
            .adjustment_interval(Duration::from_millis(20))
            .build();
        let (limiter, handle) = RateLimiter::new(config);

        for _ in 0..50 {
            limiter.record_outcome(Classification::Ok);
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        let rate = limiter.current_rate_per_minute().await;
        assert!(rate > 100.0, "expected rate to increase, got {rate}");

        if let Some(handle) = handle {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn adjustment_loop_decreases_rate_on_quota_errors() {
        let config = RateLimiterConfigBuilder::new()
            .burst(10)
            .rate_per_minute(100.0)
            .rate_bounds(10.0, 1000.0)
            .adjustment_interval(Duration::from_millis(20))
            .build();
        let (limiter, handle) = RateLimiter::new(config);

        for _ in 0..10 {
            limiter.record_outcome(Classification::QuotaError);
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        let rate = limiter.current_rate_per_minute().await;
        assert!(rate < 100.0, "expected rate to decrease, got {rate}");

        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
