//! The data model shared across the pipeline: tenant schema
//! objects, their enrichment blocks, tenant-global security entities, and
//! the corpus chunks the Emitter produces from them.

mod automation;
mod chunk;
mod field;
mod history;
mod object_ref;
mod record;
mod security;
mod stats;

pub use automation::{AutomationBlock, AutomationRef, CodeComplexity, TriggerRef};
pub use chunk::{Chunk, ChunkMetadata};
pub use field::{FieldSpec, Relationship, RelationshipKind};
pub use history::{FieldHistory, HistoryBlock};
pub use object_ref::ObjectRef;
pub use record::ObjectRecord;
pub use security::{
    FieldPermission, FieldPermissionEntry, ObjectCrud, ObjectCrudEntry, OrgSecurityModel,
    PermissionSet, PrincipalKind, Profile, Role, SecurityBlock, SecurityPrincipal,
};
pub use stats::StatsBlock;
