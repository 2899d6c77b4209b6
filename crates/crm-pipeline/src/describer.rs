//! The Describer: for each ref, fetches full schema detail via
//! one cached remote call, bounded by a worker pool of size `W` (default
//! 15). Parallelism is a counting semaphore gating concurrently in-flight
//! tasks, the same shape as
//! `tower_resilience_bulkhead::Bulkhead::call` (`Arc<Semaphore>` +
//! `acquire_owned`), generalized from "gate one `tower::Service` call" to
//! "gate one task in a `JoinSet`".

use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crm_cache::{CacheKey, CacheStore};
use crm_core::PipelineError;
use crm_model::{FieldSpec, ObjectRecord, ObjectRef, Relationship};

use crate::remote::RemoteClient;

const DATA_TYPE: &str = "describe";

#[derive(Deserialize)]
struct DescribeResponse {
    label: String,
    #[serde(default)]
    description: String,
    fields: Vec<FieldSpec>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

pub struct Describer {
    remote: RemoteClient,
    cache: Arc<CacheStore>,
    schema_version: u32,
    pool_size: usize,
}

impl Describer {
    pub fn new(remote: RemoteClient, cache: Arc<CacheStore>, schema_version: u32, pool_size: usize) -> Self {
        Self {
            remote,
            cache,
            schema_version,
            pool_size,
        }
    }

    /// Describes one ref, serving from cache when possible.
    pub async fn describe_one(
        &self,
        object_ref: &ObjectRef,
    ) -> Result<ObjectRecord, PipelineError<Infallible>> {
        let key = CacheKey::derive(DATA_TYPE, object_ref.as_str(), &[], self.schema_version);

        let raw = match self.cache.get(key).await {
            Ok(Some(hit)) => hit.payload,
            _ => {
                let value = self
                    .remote
                    .invoke_json(&["describe", "object", object_ref.as_str()], None)
                    .await?;
                let bytes = serde_json::to_vec(&value).map_err(|err| PipelineError::Consistency {
                    detail: format!("failed to re-encode describe response: {err}"),
                })?;
                let _ = self.cache.put(key, DATA_TYPE, &bytes).await;
                bytes
            }
        };

        let parsed: DescribeResponse =
            serde_json::from_slice(&raw).map_err(|err| PipelineError::Consistency {
                detail: format!("malformed describe response for {object_ref}: {err}"),
            })?;

        Ok(ObjectRecord::new(
            object_ref.clone(),
            parsed.label,
            parsed.description,
            parsed.fields,
            parsed.relationships,
        ))
    }

    /// Describes every ref in `refs`, with at most `pool_size` concurrent
    /// remote calls in flight.
    pub async fn describe_all(
        &self,
        refs: &[ObjectRef],
    ) -> Vec<(ObjectRef, Result<ObjectRecord, PipelineError<Infallible>>)> {
        let semaphore = Arc::new(Semaphore::new(self.pool_size.max(1)));
        let mut tasks = JoinSet::new();

        for object_ref in refs.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let remote = self.remote.clone();
            let cache = Arc::clone(&self.cache);
            let schema_version = self.schema_version;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("describer semaphore never closes");
                let describer = Describer {
                    remote,
                    cache,
                    schema_version,
                    pool_size: 1,
                };
                let result = describer.describe_one(&object_ref).await;
                (object_ref, result)
            });
        }

        let mut results = Vec::with_capacity(refs.len());
        while let Some(joined) = tasks.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_bridge::CliBridge;
    use crm_ratelimiter::{RateLimiter, RateLimiterConfigBuilder};
    use crm_retry::{RetryConfigBuilder, RetryEngine};

    fn describer(dir: &std::path::Path) -> Describer {
        let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
        let retry = RetryEngine::new(RetryConfigBuilder::new().build());
        let remote = RemoteClient::new(CliBridge::new("echo"), limiter, retry);
        let cache = Arc::new(CacheStore::new(dir, crm_cache::DEFAULT_TTL, 1));
        Describer::new(remote, cache, 1, 4)
    }

    #[tokio::test]
    async fn describe_one_surfaces_consistency_error_on_non_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let d = describer(dir.path());
        let result = d.describe_one(&ObjectRef::new("Account")).await;
        assert!(matches!(result, Err(PipelineError::Consistency { .. })));
    }

    #[tokio::test]
    async fn describe_one_serves_from_cache_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let d = describer(dir.path());
        let key = CacheKey::derive("describe", "Account", &[], 1);
        let payload = serde_json::json!({
            "label": "Account",
            "description": "Standard account",
            "fields": [],
            "relationships": [],
        });
        d.cache
            .put(key, "describe", &serde_json::to_vec(&payload).unwrap())
            .await
            .unwrap();

        let record = d.describe_one(&ObjectRef::new("Account")).await.unwrap();
        assert_eq!(record.label, "Account");
        assert!(record.fields.is_empty());
    }

    #[tokio::test]
    async fn describe_all_returns_one_result_per_ref() {
        let dir = tempfile::tempdir().unwrap();
        let d = describer(dir.path());
        let refs = vec![ObjectRef::new("Account"), ObjectRef::new("Contact")];
        let results = d.describe_all(&refs).await;
        assert_eq!(results.len(), 2);
    }
}
