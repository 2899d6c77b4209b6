//! `StatsEnricher`: record counts and freshness are coalesced
//! across the working set (cheap, poolable); field fill-rates and
//! picklist distributions need a sampled read per object and fall back to
//! direct, per-object remote calls bounded by a worker pool, the same
//! shape the Describer uses.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crm_coalesce::QueryCoalescer;
use crm_core::PipelineError;
use crm_model::{FieldSpec, ObjectRecord, StatsBlock};

use crate::enrichers::run_grouped_query;
use crate::remote::RemoteClient;

#[derive(Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(Deserialize)]
struct FreshnessRow {
    fresh_count: u64,
    total_count: u64,
}

#[derive(Deserialize)]
struct OwnershipRow {
    profile: String,
    count: u64,
}

pub struct StatsEnricher {
    remote: RemoteClient,
    coalescer: Arc<QueryCoalescer>,
    sample_size: u32,
    pool_size: usize,
}

impl StatsEnricher {
    pub fn new(
        remote: RemoteClient,
        coalescer: Arc<QueryCoalescer>,
        sample_size: u32,
        pool_size: usize,
    ) -> Self {
        Self {
            remote,
            coalescer,
            sample_size,
            pool_size,
        }
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
        let counts = self
            .coalescer
            .fetch::<_, _, Infallible>("record_count", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        let remote = self.remote.clone();
        let freshness = self
            .coalescer
            .fetch::<_, _, Infallible>("freshness_count", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        let remote = self.remote.clone();
        let ownership = self
            .coalescer
            .fetch::<_, _, Infallible>("record_ownership", &refs, |kind, batch| {
                run_grouped_query(&remote, kind, batch)
            })
            .await;

        let mut failed = Vec::new();
        failed.extend(counts.failed);
        failed.extend(freshness.failed);
        failed.extend(ownership.failed);

        let samples = self.sample_all(records).await;

        for record in records.iter_mut() {
            let key = record.object_ref.as_str();
            let record_count = decode_single(&counts.payloads, key)
                .map(|r: CountRow| r.count)
                .unwrap_or(0);
            let (fresh, total) = decode_single(&freshness.payloads, key)
                .map(|r: FreshnessRow| (r.fresh_count, r.total_count))
                .unwrap_or((0, 0));
            let freshness_fraction = if total == 0 {
                0.0
            } else {
                fresh as f64 / total as f64
            };
            let top_owning_profiles = decode_ownership(ownership.payloads.get(key));

            let (field_fill_rates, picklist_distributions) = samples
                .get(key)
                .cloned()
                .unwrap_or_default();

            record.stats = Some(StatsBlock {
                record_count,
                field_fill_rates,
                picklist_distributions,
                freshness_fraction,
                top_owning_profiles,
            });
        }

        failed
    }

    async fn sample_all(
        &self,
        records: &[ObjectRecord],
    ) -> HashMap<String, (HashMap<String, f64>, HashMap<String, HashMap<String, u64>>)> {
        let semaphore = Arc::new(Semaphore::new(self.pool_size.max(1)));
        let mut tasks = JoinSet::new();

        for record in records {
            let object_ref = record.object_ref.as_str().to_string();
            let fields = record.fields.clone();
            let semaphore = Arc::clone(&semaphore);
            let remote = self.remote.clone();
            let sample_size = self.sample_size;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("stats enricher semaphore never closes");
                let result = sample_one(&remote, &object_ref, &fields, sample_size).await;
                (object_ref, result)
            });
        }

        let mut out = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((object_ref, Ok(sample))) = joined {
                out.insert(object_ref, sample);
            }
        }
        out
    }
}

async fn sample_one(
    remote: &RemoteClient,
    object_ref: &str,
    fields: &[FieldSpec],
    sample_size: u32,
) -> Result<(HashMap<String, f64>, HashMap<String, HashMap<String, u64>>), PipelineError<Infallible>> {
    let limit = sample_size.to_string();
    let value = remote
        .invoke_json(
            &["run", "query", "sample_records", "--ref", object_ref, "--limit", limit.as_str()],
            None,
        )
        .await?;

    let rows = value
        .get("records")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let sampled = rows.len().max(1) as f64;

    let mut fill_counts: HashMap<String, u64> = HashMap::new();
    let mut picklist_counts: HashMap<String, HashMap<String, u64>> = HashMap::new();

    let picklist_fields: Vec<&str> = fields
        .iter()
        .filter(|f| f.field_type == "Picklist")
        .map(|f| f.name.as_str())
        .collect();

    for row in &rows {
        let Some(obj) = row.as_object() else { continue };
        for (field_name, field_value) in obj {
            if !field_value.is_null() {
                *fill_counts.entry(field_name.clone()).or_insert(0) += 1;
            }
            if picklist_fields.contains(&field_name.as_str()) {
                if let Some(value_str) = field_value.as_str() {
                    *picklist_counts
                        .entry(field_name.clone())
                        .or_default()
                        .entry(value_str.to_string())
                        .or_insert(0) += 1;
                }
            }
        }
    }

    let fill_rates = fill_counts
        .into_iter()
        .map(|(field, count)| (field, count as f64 / sampled))
        .collect();

    Ok((fill_rates, picklist_counts))
}

fn decode_single<T: for<'de> Deserialize<'de>>(
    payloads: &hashbrown::HashMap<String, Vec<u8>>,
    key: &str,
) -> Option<T> {
    let bytes = payloads.get(key)?;
    let rows: Vec<T> = serde_json::from_slice(bytes).ok()?;
    rows.into_iter().next()
}

fn decode_ownership(payload: Option<&Vec<u8>>) -> Vec<String> {
    let Some(bytes) = payload else {
        return Vec::new();
    };
    let mut rows: Vec<OwnershipRow> = serde_json::from_slice(bytes).unwrap_or_default();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows.into_iter().map(|r| r.profile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_takes_first_row() {
        let mut payloads = hashbrown::HashMap::new();
        payloads.insert(
            "Account".to_string(),
            serde_json::to_vec(&vec![serde_json::json!({"count": 42})]).unwrap(),
        );
        let row: CountRow = decode_single(&payloads, "Account").unwrap();
        assert_eq!(row.count, 42);
    }

    #[test]
    fn decode_ownership_sorts_descending_by_count() {
        let rows = vec![
            serde_json::json!({"profile": "Sales", "count": 3}),
            serde_json::json!({"profile": "Admin", "count": 10}),
        ];
        let bytes = serde_json::to_vec(&rows).unwrap();
        let profiles = decode_ownership(Some(&bytes));
        assert_eq!(profiles, vec!["Admin".to_string(), "Sales".to_string()]);
    }
}
