//! The Query Coalescer.

mod coalescer;
mod config;

pub use coalescer::{CoalesceResult, QueryCoalescer};
pub use config::{CoalesceConfig, DEFAULT_BATCH_SIZE};
