//! Unified error taxonomy for the extraction pipeline.
//!
//! [`Classification`] is the five-way split every remote call is sorted into
//! at the boundary: `ok`, `transport_error`, `quota_error`,
//! `syntactic_error`, `timeout`. [`PipelineError<E>`] wraps that
//! classification (plus the two error kinds that only apply above the
//! CLI Bridge: `Consistency` and `FatalConfig`) the same way
//! `tower_resilience_core::ResilienceError<E>` wraps bulkhead/circuit-breaker/
//! rate-limiter errors, so composing retry, rate-limiting, and caching layers
//! never requires hand-written `From` impls.

use std::fmt;
use std::time::Duration;

/// Classification of a CLI Bridge invocation's result.
///
/// Never constructed from an exception bubbling up the call stack — the
/// bridge inspects exit code and stderr directly and classifies at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Exit code zero, recognizable output.
    Ok,
    /// Transient network/subprocess failure. Always retried.
    TransportError,
    /// Remote rate/quota refusal. Retried with widened backoff.
    QuotaError,
    /// Malformed query or argument. Never retried.
    SyntacticError,
    /// Deadline exceeded before the subprocess completed.
    Timeout,
}

impl Classification {
    /// Whether the Retry Engine should attempt this outcome again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Classification::TransportError | Classification::QuotaError | Classification::Timeout
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Ok => "ok",
            Classification::TransportError => "transport_error",
            Classification::QuotaError => "quota_error",
            Classification::SyntacticError => "syntactic_error",
            Classification::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// A common error type wrapping every layer's error plus the application's.
///
/// Mirrors `tower_resilience_core::ResilienceError<E>`: composing rate
/// limiting, retry, caching, and coalescing never requires manual `From`
/// implementations because every layer error already converts into a
/// `PipelineError` variant.
#[derive(Debug, Clone)]
pub enum PipelineError<E> {
    /// Transient transport/subprocess failure (exhausted retries).
    Transport {
        /// Human-readable detail captured from stderr.
        detail: String,
    },
    /// Remote quota/rate refusal (exhausted retries).
    Quota {
        /// How long the caller should wait before retrying, if known.
        retry_after: Option<Duration>,
    },
    /// Malformed query or argument; never retried.
    Syntactic {
        /// Human-readable detail captured from stderr.
        detail: String,
    },
    /// Deadline exceeded (exhausted retries).
    Timeout {
        /// The layer whose deadline elapsed (e.g. "cli_bridge", "rate_limiter").
        layer: &'static str,
    },
    /// Unexpected parse shape or missing required field; never retried.
    Consistency {
        /// Human-readable detail about what was expected vs. observed.
        detail: String,
    },
    /// Missing credentials, unreadable cache dir, invalid flags. Aborts
    /// before any remote calls; never attached to a single ref.
    FatalConfig {
        /// Human-readable detail.
        detail: String,
    },
    /// The rate limiter rejected the call (deadline elapsed waiting for a
    /// token).
    RateLimited {
        /// How long the caller waited before giving up, if known.
        waited: Option<Duration>,
    },
    /// The wrapped application-specific error.
    Application(E),
}

impl<E> PipelineError<E> {
    /// Classifies a terminal (retry-exhausted) outcome back into the
    /// taxonomy's `Classification`, for reporting and Progress Store writes.
    pub fn classification(&self) -> Option<Classification> {
        match self {
            PipelineError::Transport { .. } => Some(Classification::TransportError),
            PipelineError::Quota { .. } => Some(Classification::QuotaError),
            PipelineError::Syntactic { .. } => Some(Classification::SyntacticError),
            PipelineError::Timeout { .. } => Some(Classification::Timeout),
            _ => None,
        }
    }

    /// Returns `true` if this is a quota error.
    pub fn is_quota(&self) -> bool {
        matches!(self, PipelineError::Quota { .. })
    }

    /// Returns `true` if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, PipelineError::Application(_))
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            PipelineError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function.
    pub fn map_application<F, T>(self, f: F) -> PipelineError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            PipelineError::Transport { detail } => PipelineError::Transport { detail },
            PipelineError::Quota { retry_after } => PipelineError::Quota { retry_after },
            PipelineError::Syntactic { detail } => PipelineError::Syntactic { detail },
            PipelineError::Timeout { layer } => PipelineError::Timeout { layer },
            PipelineError::Consistency { detail } => PipelineError::Consistency { detail },
            PipelineError::FatalConfig { detail } => PipelineError::FatalConfig { detail },
            PipelineError::RateLimited { waited } => PipelineError::RateLimited { waited },
            PipelineError::Application(e) => PipelineError::Application(f(e)),
        }
    }
}

impl<E> fmt::Display for PipelineError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Transport { detail } => write!(f, "transport error: {detail}"),
            PipelineError::Quota { retry_after } => match retry_after {
                Some(d) => write!(f, "quota exceeded, retry after {d:?}"),
                None => write!(f, "quota exceeded"),
            },
            PipelineError::Syntactic { detail } => write!(f, "syntactic error: {detail}"),
            PipelineError::Timeout { layer } => write!(f, "timeout in {layer}"),
            PipelineError::Consistency { detail } => write!(f, "consistency error: {detail}"),
            PipelineError::FatalConfig { detail } => write!(f, "fatal config error: {detail}"),
            PipelineError::RateLimited { waited } => match waited {
                Some(d) => write!(f, "rate limited after waiting {d:?}"),
                None => write!(f, "rate limited"),
            },
            PipelineError::Application(e) => write!(f, "application error: {e}"),
        }
    }
}

impl<E> std::error::Error for PipelineError<E> where E: std::error::Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    const _: () = {
        const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<PipelineError<TestError>>();
    };

    #[test]
    fn classification_is_retryable_matches_spec_table() {
        assert!(!Classification::Ok.is_retryable());
        assert!(Classification::TransportError.is_retryable());
        assert!(Classification::QuotaError.is_retryable());
        assert!(!Classification::SyntacticError.is_retryable());
        assert!(Classification::Timeout.is_retryable());
    }

    #[test]
    fn pipeline_error_classification_roundtrips() {
        let err: PipelineError<TestError> = PipelineError::Quota { retry_after: None };
        assert_eq!(err.classification(), Some(Classification::QuotaError));

        let err: PipelineError<TestError> = PipelineError::Consistency {
            detail: "missing field".into(),
        };
        assert_eq!(err.classification(), None);
    }

    #[test]
    fn map_application_preserves_non_application_variants() {
        let err: PipelineError<String> = PipelineError::Timeout { layer: "bridge" };
        let mapped: PipelineError<usize> = err.map_application(|s| s.len());
        assert!(mapped.is_timeout());
    }

    #[test]
    fn application_error_into_box_error() {
        let err: PipelineError<TestError> = PipelineError::Application(TestError);
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.to_string().contains("test error"));
    }
}
