//! The Retry Engine.
//!
//! Wraps any operation that classifies its own failures into the boundary
//! taxonomy (`crm_core::Classification`) and retries it with exponential
//! backoff, a separate floor-raised backoff for quota errors, and no retry
//! at all for syntactic/application errors.

mod backoff;
pub mod config;
mod engine;
mod events;

pub use backoff::{ExponentialJitterBackoff, IntervalFunction, QuotaFloorBackoff};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use engine::RetryEngine;
pub use events::RetryEvent;
