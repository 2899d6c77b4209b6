//! The Rate Limiter.
//!
//! A single adaptive token bucket shared by every worker. All remote calls
//! must acquire a permit here before reaching the CLI Bridge; nothing else
//! in the pipeline is allowed to throttle independently.

mod adaptive;
mod bucket;
pub mod config;
mod error;
mod events;
mod limiter;

pub use adaptive::Adjustment;
pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;
pub use limiter::RateLimiter;
