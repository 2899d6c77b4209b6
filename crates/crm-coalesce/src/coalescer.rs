//! The Query Coalescer.
//!
//! Given a data-type and a set of object refs, produces `ref -> payload`
//! using the minimum number of remote queries: cached refs are served from
//! [`crm_cache::CacheStore`] (whose own per-key locking already dedups
//! concurrent fetches of the same ref, so this crate doesn't need its own
//! in-flight bookkeeping the way `tower_resilience_coalesce::service`
//! does); uncached refs are grouped into batches and dispatched through a
//! caller-supplied query function, mirroring how `CoalesceService` wraps
//! an arbitrary inner `tower::Service` rather than hard-coding a
//! transport.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use hashbrown::HashMap;

use crm_cache::{CacheKey, CacheStore};
use crm_core::{Classification, PipelineError};

use crate::config::CoalesceConfig;

/// The outcome of a coalesced fetch: refs that resolved (cached or fresh,
/// empty payload if the remote genuinely has nothing for that ref) and
/// refs that failed even after the single-ref fallback.
#[derive(Debug, Default)]
pub struct CoalesceResult<E> {
    pub payloads: HashMap<String, Vec<u8>>,
    pub failed: Vec<(String, PipelineError<E>)>,
}

/// Batches and dispatches per-ref queries for one data-type.
pub struct QueryCoalescer {
    cache: CacheStore,
    config: CoalesceConfig,
}

impl QueryCoalescer {
    pub fn new(cache: CacheStore, config: CoalesceConfig) -> Self {
        Self { cache, config }
    }

    /// Fetches `refs` for `data_type`, using `query_fn` for whatever isn't
    /// already cached. `query_fn` receives the data-type and a batch of
    /// refs and returns a map of whichever refs it found payloads for;
    /// refs missing from the returned map are treated as legitimate empty
    /// results, not errors.
    pub async fn fetch<F, Fut, E>(
        &self,
        data_type: &str,
        refs: &[String],
        query_fn: F,
    ) -> CoalesceResult<E>
    where
        F: Fn(&str, &[String]) -> Fut + Sync,
        Fut: Future<Output = Result<HashMap<String, Vec<u8>>, PipelineError<E>>> + Send,
        E: Send + 'static,
    {
        let mut payloads = HashMap::new();
        let mut uncached = Vec::new();

        for object_ref in refs {
            let key = CacheKey::derive(data_type, object_ref, &[], self.config.schema_version);
            match self.cache.get(key).await {
                Ok(Some(hit)) => {
                    payloads.insert(object_ref.clone(), hit.payload);
                }
                _ => uncached.push(object_ref.clone()),
            }
        }

        let mut failed = Vec::new();
        if !uncached.is_empty() {
            let batch_size = self.config.batch_size(data_type);
            for batch in uncached.chunks(batch_size) {
                let (fetched, batch_failed) = self
                    .fetch_batch(data_type, batch.to_vec(), &query_fn)
                    .await;

                for (object_ref, payload) in fetched {
                    let key = CacheKey::derive(
                        data_type,
                        &object_ref,
                        &[],
                        self.config.schema_version,
                    );
                    let _ = self.cache.put(key, data_type, &payload).await;
                    payloads.insert(object_ref, payload);
                }
                failed.extend(batch_failed);
            }
        }

        CoalesceResult { payloads, failed }
    }

    /// Dispatches one batch; on `syntactic_error` halves the batch and
    /// recurses, down to single-ref batches. A
    /// single-ref batch that still fails reports that ref as an error.
    fn fetch_batch<'a, F, Fut, E>(
        &'a self,
        data_type: &'a str,
        batch: Vec<String>,
        query_fn: &'a F,
    ) -> BoxFuture<'a, (HashMap<String, Vec<u8>>, Vec<(String, PipelineError<E>)>)>
    where
        F: Fn(&str, &[String]) -> Fut + Sync,
        Fut: Future<Output = Result<HashMap<String, Vec<u8>>, PipelineError<E>>> + Send,
        E: Send + 'static,
    {
        async move {
            match query_fn(data_type, &batch).await {
                Ok(mut fetched) => {
                    // Missing refs are legitimate empty results, not errors.
                    for object_ref in &batch {
                        fetched.entry(object_ref.clone()).or_default();
                    }
                    (fetched, Vec::new())
                }
                Err(err) if batch.len() > 1 && err.classification() == Some(Classification::SyntacticError) => {
                    let mid = batch.len() / 2;
                    let (left, right) = batch.split_at(mid);
                    let (mut left_ok, mut left_failed) = self
                        .fetch_batch(data_type, left.to_vec(), query_fn)
                        .await;
                    let (right_ok, right_failed) = self
                        .fetch_batch(data_type, right.to_vec(), query_fn)
                        .await;
                    left_ok.extend(right_ok);
                    left_failed.extend(right_failed);
                    (left_ok, left_failed)
                }
                Err(err) if batch.len() == 1 => (HashMap::new(), vec![(batch[0].clone(), err)]),
                Err(err) => {
                    // Batch > 1 but not a syntactic error (e.g. transport
                    // error exhausted retries): fail every ref in the batch
                    // with the same terminal error. The caller's Retry
                    // Engine already exhausted retries before this point.
                    let failed = batch
                        .into_iter()
                        .map(|r| (r, clone_terminal_error(&err)))
                        .collect();
                    (HashMap::new(), failed)
                }
            }
        }
        .boxed()
    }
}

/// `PipelineError<E>` doesn't require `E: Clone`, so a batch-wide terminal
/// failure is re-expressed per ref from its classification rather than cloned.
fn clone_terminal_error<E>(err: &PipelineError<E>) -> PipelineError<E> {
    match err {
        PipelineError::Transport { detail } => PipelineError::Transport {
            detail: detail.clone(),
        },
        PipelineError::Quota { retry_after } => PipelineError::Quota {
            retry_after: *retry_after,
        },
        PipelineError::Timeout { layer } => PipelineError::Timeout { layer },
        PipelineError::Syntactic { detail } => PipelineError::Syntactic {
            detail: detail.clone(),
        },
        PipelineError::Consistency { detail } => PipelineError::Consistency {
            detail: detail.clone(),
        },
        PipelineError::FatalConfig { detail } => PipelineError::FatalConfig {
            detail: detail.clone(),
        },
        PipelineError::RateLimited { waited } => PipelineError::RateLimited { waited: *waited },
        PipelineError::Application(_) => PipelineError::Transport {
            detail: "application error during batched fetch".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct TestErr;

    fn store() -> CacheStore {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so it outlives the store for the duration of the test.
        let path = dir.into_path();
        CacheStore::new(path, Duration::from_secs(3600), 1)
    }

    #[tokio::test]
    async fn fetches_all_refs_in_one_batch() {
        let coalescer = QueryCoalescer::new(store(), CoalesceConfig::new(1));
        let refs = vec!["Account".to_string(), "Contact".to_string()];

        let result = coalescer
            .fetch::<_, _, TestErr>("stats", &refs, |_, batch| {
                let mut map = HashMap::new();
                for r in batch {
                    map.insert(r.clone(), format!("payload-{r}").into_bytes());
                }
                async move { Ok(map) }
            })
            .await;

        assert!(result.failed.is_empty());
        assert_eq!(result.payloads.len(), 2);
        assert_eq!(result.payloads["Account"], b"payload-Account");
    }

    #[tokio::test]
    async fn missing_refs_in_response_become_empty_not_errors() {
        let coalescer = QueryCoalescer::new(store(), CoalesceConfig::new(1));
        let refs = vec!["Account".to_string(), "Ghost".to_string()];

        let result = coalescer
            .fetch::<_, _, TestErr>("stats", &refs, |_, batch| {
                let mut map = HashMap::new();
                for r in batch {
                    if r != "Ghost" {
                        map.insert(r.clone(), b"payload".to_vec());
                    }
                }
                async move { Ok(map) }
            })
            .await;

        assert!(result.failed.is_empty());
        assert_eq!(result.payloads["Ghost"], Vec::<u8>::new());
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let coalescer = QueryCoalescer::new(store(), CoalesceConfig::new(1));
        let refs = vec!["Account".to_string()];
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls_clone = Arc::clone(&calls);
            coalescer
                .fetch::<_, _, TestErr>("stats", &refs, move |_, batch| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    let mut map = HashMap::new();
                    for r in batch {
                        map.insert(r.clone(), b"payload".to_vec());
                    }
                    async move { Ok(map) }
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn syntactic_error_halves_batch_until_single_ref_fails() {
        let coalescer = QueryCoalescer::new(store(), CoalesceConfig::new(1));
        let refs: Vec<String> = (0..4).map(|i| format!("Obj{i}")).collect();

        let result = coalescer
            .fetch::<_, _, TestErr>("stats", &refs, |_, batch| {
                let batch = batch.to_vec();
                async move {
                    if batch.len() > 1 {
                        Err(PipelineError::Syntactic {
                            detail: "clause too long".into(),
                        })
                    } else if batch[0] == "Obj2" {
                        Err(PipelineError::Syntactic {
                            detail: "still too long".into(),
                        })
                    } else {
                        let mut map = HashMap::new();
                        map.insert(batch[0].clone(), b"ok".to_vec());
                        Ok(map)
                    }
                }
            })
            .await;

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "Obj2");
        assert_eq!(result.payloads.len(), 3);
    }

    #[tokio::test]
    async fn non_syntactic_batch_failure_marks_every_ref_failed() {
        let coalescer = QueryCoalescer::new(store(), CoalesceConfig::new(1));
        let refs = vec!["Account".to_string(), "Contact".to_string()];

        let result = coalescer
            .fetch::<_, _, TestErr>("stats", &refs, |_, _batch| async {
                Err(PipelineError::Transport {
                    detail: "down".into(),
                })
            })
            .await;

        assert_eq!(result.failed.len(), 2);
        assert!(result.payloads.is_empty());
    }
}
