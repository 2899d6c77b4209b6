//! The Cache Store.
//!
//! Directory-backed, content-addressed by `(data_type, object_ref,
//! parameter_tuple, schema_version)`. Every entry is either whole or
//! absent: writes land via write-temp-fsync-rename, so a reader never sees
//! a partially written file.

mod entry;
mod error;
mod events;
mod key;
mod stats;
mod store;

pub use error::CacheError;
pub use events::CacheEvent;
pub use key::CacheKey;
pub use stats::CacheStatsSnapshot;
pub use store::{CacheHit, CacheStore, DEFAULT_TTL};
