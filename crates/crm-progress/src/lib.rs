//! The Progress & Resume Store: per-object, per-phase state
//! that survives across runs so a multi-day pipeline can resume exactly
//! where it stopped.

mod error;
mod events;
mod phase;
mod record;
mod store;

pub use error::ProgressError;
pub use events::ProgressEvent;
pub use phase::Phase;
pub use record::{ProgressRecord, ProgressState};
pub use store::ProgressStore;
