//! Backoff interval strategies.
//!
//! Adapted from `tower-retry-plus`'s `IntervalFunction`/`ExponentialRandomBackoff`
//! pair, narrowed to two shapes: a standard exponential backoff with ±25%
//! jitter for transport/timeout errors, and a floor-raised, wider-jitter
//! variant for quota errors.

use std::time::Duration;

use rand::Rng;

/// Computes the delay before the next retry attempt.
pub trait IntervalFunction: Send + Sync {
    /// `attempt` is 0-indexed: the delay before the *first* retry uses 0.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// `base_ms * 2^attempt`, jittered by ±`jitter_factor`, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialJitterBackoff {
    base: Duration,
    jitter_factor: f64,
    max_interval: Option<Duration>,
}

impl ExponentialJitterBackoff {
    pub fn new(base: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_interval: None,
        }
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn jitter(&self, duration: Duration) -> Duration {
        let delta = duration.as_secs_f64() * self.jitter_factor;
        let min = (duration.as_secs_f64() - delta).max(0.0);
        let max = duration.as_secs_f64() + delta;
        let randomized = rand::rng().random_range(min..=max);
        Duration::from_secs_f64(randomized)
    }
}

impl IntervalFunction for ExponentialJitterBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let unjittered = self.base.mul_f64(2f64.powi(attempt as i32));
        let capped = match self.max_interval {
            Some(max) => unjittered.min(max),
            None => unjittered,
        };
        self.jitter(capped)
    }
}

/// A fixed floor, jittered wider than the standard backoff.
#[derive(Debug, Clone)]
pub struct QuotaFloorBackoff {
    floor: Duration,
    jitter_factor: f64,
}

impl QuotaFloorBackoff {
    pub fn new(floor: Duration, jitter_factor: f64) -> Self {
        Self {
            floor,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl IntervalFunction for QuotaFloorBackoff {
    fn next_interval(&self, _attempt: usize) -> Duration {
        let delta = self.floor.as_secs_f64() * self.jitter_factor;
        let min = self.floor.as_secs_f64();
        let max = self.floor.as_secs_f64() + delta;
        let randomized = rand::rng().random_range(min..=max);
        Duration::from_secs_f64(randomized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_grows_within_jitter_band() {
        let backoff = ExponentialJitterBackoff::new(Duration::from_millis(500), 0.25);
        for attempt in 0..4 {
            let unjittered = Duration::from_millis(500).mul_f64(2f64.powi(attempt as i32));
            let interval = backoff.next_interval(attempt);
            let lower = unjittered.mul_f64(0.75);
            let upper = unjittered.mul_f64(1.25);
            assert!(
                interval >= lower && interval <= upper,
                "attempt {attempt}: {interval:?} outside [{lower:?}, {upper:?}]"
            );
        }
    }

    #[test]
    fn exponential_backoff_respects_cap() {
        let backoff = ExponentialJitterBackoff::new(Duration::from_millis(500), 0.0)
            .max_interval(Duration::from_secs(2));
        assert_eq!(backoff.next_interval(10), Duration::from_secs(2));
    }

    #[test]
    fn quota_floor_backoff_never_goes_below_floor() {
        let backoff = QuotaFloorBackoff::new(Duration::from_secs(30), 0.5);
        for attempt in 0..5 {
            let interval = backoff.next_interval(attempt);
            assert!(interval >= Duration::from_secs(30));
            assert!(interval <= Duration::from_secs(45));
        }
    }

    #[test]
    fn quota_floor_backoff_ignores_attempt_number() {
        // Unlike the exponential strategy, the floor doesn't grow with attempts.
        let backoff = QuotaFloorBackoff::new(Duration::from_secs(30), 0.0);
        assert_eq!(backoff.next_interval(0), backoff.next_interval(9));
    }
}
