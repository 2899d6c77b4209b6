//! `FieldSecurityEnricher`: one coalesced query joining
//! field-permissions with the working set, producing a per-field,
//! per-principal `{read, edit}` entry. A second coalesced query covers
//! object-level CRUD, since `SecurityBlock` carries both field-level and
//! object-level permission data, which can't naturally come from one
//! query without producing a much wider, sparser row.

use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;

use crm_coalesce::QueryCoalescer;
use crm_core::PipelineError;
use crm_model::{
    FieldPermission, FieldPermissionEntry, ObjectCrud, ObjectCrudEntry, ObjectRecord,
    PrincipalKind, SecurityBlock, SecurityPrincipal,
};

use crate::enrichers::run_grouped_query;
use crate::remote::RemoteClient;

#[derive(Deserialize)]
struct FieldPermissionRow {
    field_name: String,
    principal_name: String,
    principal_kind: PrincipalKind,
    read: bool,
    edit: bool,
}

#[derive(Deserialize)]
struct ObjectCrudRow {
    principal_name: String,
    principal_kind: PrincipalKind,
    create: bool,
    read: bool,
    edit: bool,
    delete: bool,
}

pub struct FieldSecurityEnricher {
    remote: RemoteClient,
    coalescer: Arc<QueryCoalescer>,
}

impl FieldSecurityEnricher {
    pub fn new(remote: RemoteClient, coalescer: Arc<QueryCoalescer>) -> Self {
        Self { remote, coalescer }
    }

    pub async fn enrich(
        &self,
        records: &mut [ObjectRecord],
    ) -> Vec<(String, PipelineError<Infallible>)> {
        let refs: Vec<String> = records
            .iter()
            .map(|r| r.object_ref.as_str().to_string())
            .collect();

        let remote = self.remote.clone();
        let field_permissions = self
            .coalescer
            .fetch::<_, _, Infallible>("field_permissions", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        let remote = self.remote.clone();
        let object_crud = self
            .coalescer
            .fetch::<_, _, Infallible>("object_crud", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        let mut failed = Vec::new();
        failed.extend(field_permissions.failed);
        failed.extend(object_crud.failed);

        for record in records.iter_mut() {
            let key = record.object_ref.as_str();
            record.security = Some(SecurityBlock {
                field_permissions: decode_field_permissions(field_permissions.payloads.get(key)),
                object_crud: decode_object_crud(object_crud.payloads.get(key)),
            });
        }

        failed
    }
}

fn decode_field_permissions(payload: Option<&Vec<u8>>) -> Vec<FieldPermissionEntry> {
    let Some(bytes) = payload else {
        return Vec::new();
    };
    let rows: Vec<FieldPermissionRow> = serde_json::from_slice(bytes).unwrap_or_default();
    rows.into_iter()
        .map(|r| FieldPermissionEntry {
            field_name: r.field_name,
            principal: SecurityPrincipal {
                name: r.principal_name,
                kind: r.principal_kind,
            },
            permission: FieldPermission {
                read: r.read,
                edit: r.edit,
            },
        })
        .collect()
}

fn decode_object_crud(payload: Option<&Vec<u8>>) -> Vec<ObjectCrudEntry> {
    let Some(bytes) = payload else {
        return Vec::new();
    };
    let rows: Vec<ObjectCrudRow> = serde_json::from_slice(bytes).unwrap_or_default();
    rows.into_iter()
        .map(|r| ObjectCrudEntry {
            principal: SecurityPrincipal {
                name: r.principal_name,
                kind: r.principal_kind,
            },
            crud: ObjectCrud {
                create: r.create,
                read: r.read,
                edit: r.edit,
                delete: r.delete,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_bridge::CliBridge;
    use crm_cache::CacheStore;
    use crm_coalesce::CoalesceConfig;
    use crm_model::ObjectRef;
    use crm_ratelimiter::{RateLimiter, RateLimiterConfigBuilder};
    use crm_retry::{RetryConfigBuilder, RetryEngine};

    #[test]
    fn decode_field_permissions_builds_entries() {
        let rows = vec![serde_json::json!({
            "field_name": "Amount",
            "principal_name": "Standard",
            "principal_kind": "profile",
            "read": true,
            "edit": false,
        })];
        let bytes = serde_json::to_vec(&rows).unwrap();
        let entries = decode_field_permissions(Some(&bytes));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name, "Amount");
        assert!(entries[0].permission.read);
        assert!(!entries[0].permission.edit);
    }

    #[tokio::test]
    async fn enrich_attaches_security_block_to_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let (limiter, _handle) = RateLimiter::new(RateLimiterConfigBuilder::new().build());
        let retry = RetryEngine::new(RetryConfigBuilder::new().build());
        let remote = RemoteClient::new(CliBridge::new("echo"), limiter, retry);
        let cache = CacheStore::new(dir.path(), crm_cache::DEFAULT_TTL, 1);
        let coalescer = Arc::new(QueryCoalescer::new(cache, CoalesceConfig::new(1)));
        let enricher = FieldSecurityEnricher::new(remote, coalescer);

        let mut records = vec![ObjectRecord::new(
            ObjectRef::new("Account"),
            "Account",
            "",
            vec![],
            vec![],
        )];
        let _ = enricher.enrich(&mut records).await;
        assert!(records[0].security.is_some());
    }
}
