//! The Enumerator: lists all first-class object refs, applies
//! the noise and namespace filters, and returns them in deterministic
//! (lexicographic) order so downstream batching is reproducible.

use std::convert::Infallible;

use crm_core::PipelineError;
use crm_model::ObjectRef;

use crate::remote::RemoteClient;

/// Namespace/prefix filtering policy.
#[derive(Debug, Clone, Default)]
pub struct EnumeratorFilters {
    /// Refs starting with any of these prefixes are dropped.
    pub noise_prefixes: Vec<String>,
    /// Refs whose namespace (the part before the first `__`) is in this
    /// list are dropped.
    pub excluded_namespaces: Vec<String>,
}

impl EnumeratorFilters {
    fn allows(&self, object_ref: &str) -> bool {
        if self
            .noise_prefixes
            .iter()
            .any(|prefix| object_ref.starts_with(prefix.as_str()))
        {
            return false;
        }

        if let Some((namespace, _)) = object_ref.split_once("__") {
            if self
                .excluded_namespaces
                .iter()
                .any(|excluded| excluded == namespace)
            {
                return false;
            }
        }

        true
    }
}

pub struct Enumerator {
    remote: RemoteClient,
}

impl Enumerator {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    /// Lists and filters the tenant's working set of object refs.
    pub async fn enumerate(
        &self,
        filters: &EnumeratorFilters,
    ) -> Result<Vec<ObjectRef>, PipelineError<Infallible>> {
        let value = self.remote.invoke_json(&["list", "objects"], None).await?;

        let names = value
            .get("objects")
            .and_then(|v| v.as_array())
            .ok_or_else(|| PipelineError::Consistency {
                detail: "expected `objects` array in list-objects response".to_string(),
            })?;

        let mut refs: Vec<ObjectRef> = names
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|name| filters.allows(name))
            .map(ObjectRef::new)
            .collect();

        refs.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        refs.dedup_by(|a, b| a.as_str() == b.as_str());

        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_bridge::CliBridge;
    use crm_ratelimiter::{RateLimiter, RateLimiterConfigBuilder};
    use crm_retry::{RetryConfigBuilder, RetryEngine};

    #[test]
    fn noise_prefix_is_excluded() {
        let filters = EnumeratorFilters {
            noise_prefixes: vec!["zz_".to_string()],
            excluded_namespaces: vec![],
        };
        assert!(!filters.allows("zz_Scratch"));
        assert!(filters.allows("Account"));
    }

    #[test]
    fn excluded_namespace_is_excluded() {
        let filters = EnumeratorFilters {
            noise_prefixes: vec![],
            excluded_namespaces: vec!["excl".to_string()],
        };
        assert!(!filters.allows("excl__Other__c"));
        assert!(filters.allows("ns__Thing__c"));
        assert!(filters.allows("Account"));
    }

    #[tokio::test]
    async fn enumerate_end_to_end_against_echoed_json() {
        let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
        let retry = RetryEngine::new(RetryConfigBuilder::new().build());
        let remote = RemoteClient::new(CliBridge::new("echo"), limiter, retry);
        let enumerator = Enumerator::new(remote);

        let refs = enumerator
            .enumerate(&EnumeratorFilters {
                noise_prefixes: vec!["zz_".to_string()],
                excluded_namespaces: vec![],
            })
            .await;

        // `echo list objects` doesn't emit JSON, so this exercises the
        // Consistency-error path rather than a happy path (covered above
        // via direct filter-method assertions, since stubbing the tenant
        // CLI's JSON output requires a real fixture binary).
        assert!(matches!(refs, Err(PipelineError::Consistency { .. })));
    }
}
