//! The Enrichers: independently invocable passes that each
//! attach one block to every [`ObjectRecord`](crm_model::ObjectRecord) in
//! the working set. Enrichers may run concurrently with each other; each
//! reads the same record set and writes only its own block, so there's no
//! shared mutable state between them beyond the coalescer/cache they're
//! each handed.

mod automation;
mod field_security;
mod history;
mod org_security;
mod stats;

pub use automation::AutomationEnricher;
pub use field_security::FieldSecurityEnricher;
pub use history::HistoryEnricher;
pub use org_security::OrgSecurityEnricher;
pub use stats::StatsEnricher;

use std::collections::HashMap as StdHashMap;
use std::convert::Infallible;

use hashbrown::HashMap;

use crm_core::PipelineError;

use crate::remote::RemoteClient;

/// Runs a single coalesced query for `query_kind` against `batch`, then
/// groups the response rows back to refs by their `ref` field.
/// Each ref's payload is the JSON-encoded array of its own rows.
pub(crate) async fn run_grouped_query(
    remote: &RemoteClient,
    query_kind: &str,
    batch: &[String],
) -> Result<HashMap<String, Vec<u8>>, PipelineError<Infallible>> {
    let refs_arg = batch.join(",");
    let value = remote
        .invoke_json(&["run", "query", query_kind, "--refs", &refs_arg], None)
        .await?;

    let rows = value
        .get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut grouped: StdHashMap<String, Vec<serde_json::Value>> = StdHashMap::new();
    for row in rows {
        let Some(object_ref) = row.get("ref").and_then(|v| v.as_str()) else {
            continue;
        };
        grouped.entry(object_ref.to_string()).or_default().push(row);
    }

    let mut out = HashMap::new();
    for (object_ref, rows) in grouped {
        let bytes = serde_json::to_vec(&rows).unwrap_or_default();
        out.insert(object_ref, bytes);
    }
    Ok(out)
}
