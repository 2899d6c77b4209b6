//! Composes the Rate Limiter, Retry Engine, and CLI Bridge into the single
//! path every remote call takes. Every other
//! component (Enumerator, Describer, Enrichers, Uploader) calls through
//! this instead of touching `crm_bridge::CliBridge` directly, so the
//! "Rate Limiter is the sole gate for outbound remote calls" invariant
//! holds structurally rather than by convention.

use std::convert::Infallible;
use std::time::Duration;

use crm_bridge::{BridgeOutcome, CliBridge};
use crm_core::{Classification, PipelineError};
use crm_ratelimiter::{RateLimiter, RateLimiterError};
use crm_retry::RetryEngine;

/// How long a single remote call will wait for a rate-limiter token before
/// giving up.
pub const DEFAULT_ACQUIRE_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RemoteClient {
    bridge: CliBridge,
    rate_limiter: RateLimiter,
    retry: std::sync::Arc<RetryEngine>,
    acquire_deadline: Duration,
}

impl RemoteClient {
    pub fn new(bridge: CliBridge, rate_limiter: RateLimiter, retry: RetryEngine) -> Self {
        Self {
            bridge,
            rate_limiter,
            retry: std::sync::Arc::new(retry),
            acquire_deadline: DEFAULT_ACQUIRE_DEADLINE,
        }
    }

    pub fn with_acquire_deadline(mut self, deadline: Duration) -> Self {
        self.acquire_deadline = deadline;
        self
    }

    /// Invokes the tenant CLI with `argv`/`stdin`, retried per the Retry
    /// Engine's policy, gated by the Rate Limiter on every attempt.
    pub async fn invoke(
        &self,
        argv: &[&str],
        stdin: Option<&str>,
    ) -> Result<BridgeOutcome, PipelineError<Infallible>> {
        self.retry
            .call(|_attempt| async {
                match self.rate_limiter.acquire(self.acquire_deadline).await {
                    Ok(_waited) => {}
                    Err(RateLimiterError::DeadlineExceeded { .. }) => {
                        return Err(PipelineError::RateLimited {
                            waited: Some(self.acquire_deadline),
                        });
                    }
                }

                let outcome = match self.bridge.run(argv, stdin).await {
                    Ok(outcome) => outcome,
                    Err(spawn_err) => {
                        return Err(PipelineError::FatalConfig {
                            detail: spawn_err.to_string(),
                        });
                    }
                };

                self.rate_limiter.record_outcome(outcome.classification);

                match outcome.classification {
                    Classification::Ok => Ok(outcome),
                    Classification::TransportError => Err(PipelineError::Transport {
                        detail: outcome.stderr,
                    }),
                    Classification::QuotaError => Err(PipelineError::Quota { retry_after: None }),
                    Classification::SyntacticError => Err(PipelineError::Syntactic {
                        detail: outcome.stderr,
                    }),
                    Classification::Timeout => Err(PipelineError::Timeout {
                        layer: "cli_bridge",
                    }),
                }
            })
            .await
    }

    /// As [`RemoteClient::invoke`], parsing stdout as JSON. A response
    /// that doesn't parse is a `Consistency` error: never
    /// retried, surfaced to the caller to mark the ref errored.
    pub async fn invoke_json(
        &self,
        argv: &[&str],
        stdin: Option<&str>,
    ) -> Result<serde_json::Value, PipelineError<Infallible>> {
        let outcome = self.invoke(argv, stdin).await?;
        serde_json::from_str(&outcome.stdout).map_err(|err| PipelineError::Consistency {
            detail: format!("failed to parse CLI JSON output: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_ratelimiter::RateLimiterConfigBuilder;
    use crm_retry::RetryConfigBuilder;

    fn client() -> RemoteClient {
        let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
        let retry = RetryEngine::new(RetryConfigBuilder::new().build());
        RemoteClient::new(CliBridge::new("echo"), limiter, retry)
    }

    #[tokio::test]
    async fn invoke_json_parses_cli_stdout() {
        let remote = client();
        let value = remote
            .invoke_json(&[r#"{"ok":true}"#], None)
            .await
            .unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn invoke_json_reports_consistency_error_on_bad_json() {
        let remote = client();
        let result = remote.invoke_json(&["not json"], None).await;
        assert!(matches!(result, Err(PipelineError::Consistency { .. })));
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_fatal_config() {
        let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
        let retry = RetryEngine::new(RetryConfigBuilder::new().build());
        let remote = RemoteClient::new(
            CliBridge::new("definitely-not-a-real-binary-xyz"),
            limiter,
            retry,
        );

        let result = remote.invoke(&[], None).await;
        assert!(matches!(result, Err(PipelineError::FatalConfig { .. })));
    }
}
