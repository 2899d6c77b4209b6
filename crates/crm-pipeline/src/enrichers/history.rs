//! `HistoryEnricher`: one coalesced query over custom fields,
//! producing per-custom-field `{created_by, created_at, modified_by,
//! modified_at}`.

use std::convert::Infallible;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crm_coalesce::QueryCoalescer;
use crm_core::PipelineError;
use crm_model::{FieldHistory, HistoryBlock, ObjectRecord};

use crate::enrichers::run_grouped_query;
use crate::remote::RemoteClient;

#[derive(Deserialize)]
struct FieldHistoryRow {
    field_name: String,
    created_by: String,
    created_at: DateTime<Utc>,
    modified_by: String,
    modified_at: DateTime<Utc>,
}

pub struct HistoryEnricher {
    remote: RemoteClient,
    coalescer: Arc<QueryCoalescer>,
}

impl HistoryEnricher {
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
        let result = self
            .coalescer
            .fetch::<_, _, Infallible>("custom_field_history", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        for record in records.iter_mut() {
            let key = record.object_ref.as_str();
            record.history = Some(HistoryBlock {
                fields: decode_history(result.payloads.get(key)),
            });
        }

        result.failed
    }
}

fn decode_history(payload: Option<&Vec<u8>>) -> std::collections::HashMap<String, FieldHistory> {
    let Some(bytes) = payload else {
        return std::collections::HashMap::new();
    };
    let rows: Vec<FieldHistoryRow> = serde_json::from_slice(bytes).unwrap_or_default();
    rows.into_iter()
        .map(|r| {
            (
                r.field_name,
                FieldHistory {
                    created_by: r.created_by,
                    created_at: r.created_at,
                    modified_by: r.modified_by,
                    modified_at: r.modified_at,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_history_keys_by_field_name() {
        let now = Utc::now();
        let rows = vec![serde_json::json!({
            "field_name": "Custom__c",
            "created_by": "alice",
            "created_at": now,
            "modified_by": "bob",
            "modified_at": now,
        })];
        let bytes = serde_json::to_vec(&rows).unwrap();
        let history = decode_history(Some(&bytes));
        assert_eq!(history.len(), 1);
        assert_eq!(history["Custom__c"].created_by, "alice");
    }

    #[test]
    fn decode_history_is_empty_for_missing_payload() {
        assert!(decode_history(None).is_empty());
    }
}
