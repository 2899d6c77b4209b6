//! Adaptive rate adjustment.
//!
//! Every 60s, looks at the success ratio over the past window and
//! multiplicatively adjusts the bucket's refill rate: up 1.2x when the
//! window was clean (>95% success, zero quota errors), down 0.5x when it
//! was not (any quota error, or success <80%). Otherwise the rate holds.
//!
//! This is the same shape as `tower_resilience_core::aimd::AimdController`
//! (atomics tracking a feedback-controlled limit) but multiplicative on
//! both increase and decrease, rather than AIMD's usual additive increase.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome window used to decide the next adjustment.
#[derive(Debug, Default)]
pub(crate) struct OutcomeWindow {
    successes: AtomicU64,
    failures: AtomicU64,
    quota_errors: AtomicU64,
}

impl OutcomeWindow {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_quota_error(&self) {
        self.quota_errors.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots and resets counters, returning (successes, failures, quota_errors).
    pub(crate) fn take_snapshot(&self) -> (u64, u64, u64) {
        (
            self.successes.swap(0, Ordering::Relaxed),
            self.failures.swap(0, Ordering::Relaxed),
            self.quota_errors.swap(0, Ordering::Relaxed),
        )
    }
}

/// The decision an adjustment window produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Multiply the rate by 1.2 (clamped to max).
    Increase,
    /// Multiply the rate by 0.5 (clamped to min).
    Decrease,
    /// No calls observed, or the window was neither clean nor bad enough
    /// to move in either direction.
    Hold,
}

/// Multiplier applied on a clean window.
pub const INCREASE_FACTOR: f64 = 1.2;
/// Multiplier applied on a degraded window.
pub const DECREASE_FACTOR: f64 = 0.5;
/// Success ratio above which a window counts as "clean".
pub const CLEAN_SUCCESS_RATIO: f64 = 0.95;
/// Success ratio below which a window counts as "degraded".
pub const DEGRADED_SUCCESS_RATIO: f64 = 0.80;

/// Decides the adjustment for a window snapshot.
pub(crate) fn decide(successes: u64, failures: u64, quota_errors: u64) -> Adjustment {
    let total = successes + failures;
    if total == 0 {
        return Adjustment::Hold;
    }

    let success_ratio = successes as f64 / total as f64;

    if success_ratio > CLEAN_SUCCESS_RATIO && quota_errors == 0 {
        Adjustment::Increase
    } else if quota_errors > 0 || success_ratio < DEGRADED_SUCCESS_RATIO {
        Adjustment::Decrease
    } else {
        Adjustment::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_window_increases() {
        assert_eq!(decide(96, 4, 0), Adjustment::Increase);
    }

    #[test]
    fn any_quota_error_decreases_even_with_high_success() {
        assert_eq!(decide(99, 1, 1), Adjustment::Decrease);
    }

    #[test]
    fn low_success_ratio_decreases() {
        assert_eq!(decide(70, 30, 0), Adjustment::Decrease);
    }

    #[test]
    fn middling_window_holds() {
        assert_eq!(decide(90, 10, 0), Adjustment::Hold);
    }

    #[test]
    fn empty_window_holds() {
        assert_eq!(decide(0, 0, 0), Adjustment::Hold);
    }

    #[test]
    fn outcome_window_round_trips_and_resets() {
        let window = OutcomeWindow::new();
        window.record_success();
        window.record_success();
        window.record_failure();
        window.record_quota_error();

        let (s, f, q) = window.take_snapshot();
        assert_eq!(s, 2);
        assert_eq!(f, 2); // failure + quota_error both count as failures
        assert_eq!(q, 1);

        // Snapshot resets counters.
        let (s2, f2, q2) = window.take_snapshot();
        assert_eq!((s2, f2, q2), (0, 0, 0));
    }
}
