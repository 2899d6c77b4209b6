//! The CLI Bridge.
//!
//! Invokes the tenant's pre-authenticated CLI as a subprocess, captures its
//! output, and classifies the result into `{ok, transport_error,
//! quota_error, syntactic_error, timeout}` at the boundary. Never retries
//! or inspects quota state itself — that is the Retry Engine's and Rate
//! Limiter's job (crates `crm-retry`, `crm-ratelimiter`).

mod bridge;
pub mod classify;
mod error;

pub use bridge::{BridgeOutcome, CliBridge, CANCELLATION_GRACE_PERIOD, DEFAULT_TIMEOUT};
pub use classify::{ClassificationRule, DEFAULT_RULES};
pub use error::BridgeError;
