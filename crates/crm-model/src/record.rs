use serde::{Deserialize, Serialize};

use crm_core::{content_hash, ContentHash};

use crate::automation::AutomationBlock;
use crate::field::{FieldSpec, Relationship};
use crate::history::HistoryBlock;
use crate::object_ref::ObjectRef;
use crate::security::SecurityBlock;
use crate::stats::StatsBlock;

/// The hashable view of an [`ObjectRecord`]: everything except the hash
/// itself. Hashing this instead of the full record keeps `content_hash`
/// from folding in on its own previous value.
#[derive(Serialize)]
struct Hashable<'a> {
    object_ref: &'a ObjectRef,
    label: &'a str,
    description: &'a str,
    fields: &'a [FieldSpec],
    relationships: &'a [Relationship],
    stats: &'a Option<StatsBlock>,
    automation: &'a Option<AutomationBlock>,
    security: &'a Option<SecurityBlock>,
    history: &'a Option<HistoryBlock>,
}

/// A tenant schema object and everything the pipeline has learned about
/// it. Created by the Describer with every enrichment block
/// unset, filled in place by whichever enrichers are enabled, hashed once
/// enrichment finishes, then handed to the Corpus Emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(rename = "ref")]
    pub object_ref: ObjectRef,
    pub label: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryBlock>,
    /// Unset (`None`) until [`ObjectRecord::finalize_hash`] runs after all
    /// enrichers have completed for this ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ObjectRecord {
    /// Constructs a bare record as produced by the Describer:
    /// fields and relationships populated, every enrichment block unset,
    /// hash unset.
    pub fn new(
        object_ref: ObjectRef,
        label: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<FieldSpec>,
        relationships: Vec<Relationship>,
    ) -> Self {
        Self {
            object_ref,
            label: label.into(),
            description: description.into(),
            fields,
            relationships,
            stats: None,
            automation: None,
            security: None,
            history: None,
            content_hash: None,
        }
    }

    /// Computes and stores `content_hash` over the canonical JSON of
    /// everything but the hash field itself. Called once all
    /// enrichers have finished writing their blocks for this ref.
    ///
    /// `fields` and `relationships` are semantically unordered, so they're
    /// sorted by their natural key before hashing: two records that differ
    /// only in field/relationship arrival order must hash identically.
    pub fn finalize_hash(&mut self) -> ContentHash {
        let mut fields = self.fields.clone();
        fields.sort_by(|a, b| a.key().cmp(b.key()));
        let mut relationships = self.relationships.clone();
        relationships.sort_by(|a, b| a.key().cmp(b.key()));

        let hashable = Hashable {
            object_ref: &self.object_ref,
            label: &self.label,
            description: &self.description,
            fields: &fields,
            relationships: &relationships,
            stats: &self.stats,
            automation: &self.automation,
            security: &self.security,
            history: &self.history,
        };
        let hash = content_hash(&hashable);
        self.content_hash = Some(hash.to_hex());
        hash
    }
}
