use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`crate::RateLimiter::acquire`].
#[derive(Debug, Error)]
pub enum RateLimiterError {
    /// The caller's deadline elapsed before a token became available.
    /// Retryable: the caller may simply try again with a fresh deadline.
    #[error("rate limiter deadline of {deadline:?} exceeded while waiting for a permit")]
    DeadlineExceeded { deadline: Duration },
}
