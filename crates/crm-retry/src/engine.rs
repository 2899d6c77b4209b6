//! The retry loop itself.

use std::future::Future;
use std::time::Instant;

use crm_core::{Classification, PipelineError};

use crate::backoff::IntervalFunction;
use crate::config::RetryConfig;
use crate::events::RetryEvent;

/// Wraps an operation that produces a [`PipelineError<E>`] and retries it
/// according to the boundary classification:
/// - no classification (syntactic/consistency/fatal-config/application) → fatal, returned immediately.
/// - `transport_error` / `timeout` / `quota_error` → retried up to `max_attempts`, with the
///   backoff shape depending on which one it was.
pub struct RetryEngine {
    config: RetryConfig,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `op`, retrying per the configured policy. `op` receives the
    /// 0-indexed attempt number.
    pub async fn call<T, E, F, Fut>(&self, mut op: F) -> Result<T, PipelineError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, PipelineError<E>>>,
    {
        let mut attempt = 0usize;

        loop {
            let result = op(attempt).await;

            let classification = match &result {
                Ok(_) => {
                    self.config.listeners.emit(&RetryEvent::Success {
                        attempts: attempt + 1,
                        timestamp: Instant::now(),
                    });
                    return result;
                }
                Err(err) => err.classification(),
            };

            let Some(classification) = classification else {
                // Syntactic, Consistency, FatalConfig, RateLimited, or
                // Application error: not part of the retry taxonomy, fatal.
                self.config.listeners.emit(&RetryEvent::Fatal {
                    timestamp: Instant::now(),
                });
                return result;
            };

            if !classification.is_retryable() {
                self.config.listeners.emit(&RetryEvent::Fatal {
                    timestamp: Instant::now(),
                });
                return result;
            }

            attempt += 1;
            if attempt >= self.config.max_attempts {
                self.config.listeners.emit(&RetryEvent::Exhausted {
                    attempts: attempt,
                    classification,
                    timestamp: Instant::now(),
                });
                return result;
            }

            let backoff: &dyn IntervalFunction = match classification {
                Classification::QuotaError => self.config.quota_backoff.as_ref(),
                Classification::Timeout => self.config.timeout_backoff.as_ref(),
                _ => self.config.transport_backoff.as_ref(),
            };
            let delay = backoff.next_interval(attempt - 1);

            self.config.listeners.emit(&RetryEvent::Retry {
                attempt,
                delay,
                classification,
                timestamp: Instant::now(),
            });

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfigBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct AppErr;

    impl std::fmt::Display for AppErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "app err")
        }
    }
    impl std::error::Error for AppErr {}

    #[tokio::test]
    async fn succeeds_without_retry_on_first_ok() {
        let engine = RetryEngine::new(RetryConfigBuilder::new().build());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, PipelineError<AppErr>> = engine
            .call(move |_attempt| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transport_error_then_succeeds() {
        let engine = RetryEngine::new(
            RetryConfigBuilder::new()
                .transport_base(Duration::from_millis(1))
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, PipelineError<AppErr>> = engine
            .call(move |_attempt| {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::Transport {
                            detail: "boom".into(),
                        })
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_syntactic_error() {
        let engine = RetryEngine::new(RetryConfigBuilder::new().build());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, PipelineError<AppErr>> = engine
            .call(move |_attempt| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::Syntactic { detail: "bad".into() }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_retries_application_error() {
        let engine = RetryEngine::new(RetryConfigBuilder::new().build());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, PipelineError<AppErr>> = engine
            .call(move |_attempt| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::Application(AppErr)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let engine = RetryEngine::new(
            RetryConfigBuilder::new()
                .max_attempts(3)
                .transport_base(Duration::from_millis(1))
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, PipelineError<AppErr>> = engine
            .call(move |_attempt| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(PipelineError::Transport {
                        detail: "still down".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
