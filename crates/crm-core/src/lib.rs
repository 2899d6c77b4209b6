//! Shared infrastructure for the corpus extraction pipeline.
//!
//! Provides the cross-component event system, the unified error taxonomy,
//! and deterministic content hashing used by every other crate in the
//! workspace.

pub mod error;
pub mod events;
pub mod hash;

pub use error::{Classification, PipelineError};
pub use events::{EventListener, EventListeners, FnListener, PipelineEvent};
pub use hash::{content_hash, ContentHash};
