use serde::{Deserialize, Serialize};

use crate::object_ref::ObjectRef;

/// A single field definition on an object. `type` is the
/// tenant's own field-type label (e.g. `"Text"`, `"Picklist"`,
/// `"Lookup"`) and is left as an open string rather than a closed enum,
/// since the tenant schema can introduce new field types the pipeline
/// doesn't need to understand to extract and re-serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub unique: bool,
    pub external_id: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_to: Option<ObjectRef>,
}

impl FieldSpec {
    /// A `FieldSpec` is uniquely identified within an object by name.
    pub fn key(&self) -> &str {
        &self.name
    }
}

/// The kind of relationship a [`Relationship`] represents. Not named
/// explicitly in the data model section; the tenant CLI's own describe
/// output distinguishes these two (a master-detail relationship cascades
/// deletes, a lookup does not), so both are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Lookup,
    MasterDetail,
}

/// A relationship from one object to another, surfaced alongside an
/// object's fields. The
/// exact field list isn't enumerated in the data model section; this
/// shape captures what the Describer can observe per relationship field
/// and what downstream corpus text needs to render it (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub field_name: String,
    pub target_ref: ObjectRef,
    pub kind: RelationshipKind,
    pub cascade_delete: bool,
}

impl Relationship {
    pub fn key(&self) -> &str {
        &self.field_name
    }
}
