use std::time::{Duration, Instant};

use crm_core::{Classification, PipelineEvent};

/// Events emitted by the retry engine.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry attempt is about to be made after `delay`.
    Retry {
        attempt: usize,
        delay: Duration,
        classification: Classification,
        timestamp: Instant,
    },
    /// The operation succeeded, possibly after retries.
    Success { attempts: usize, timestamp: Instant },
    /// All attempts were exhausted; the operation failed.
    Exhausted {
        attempts: usize,
        classification: Classification,
        timestamp: Instant,
    },
    /// A syntactic error was returned; never retried.
    Fatal { timestamp: Instant },
}

impl PipelineEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::Fatal { .. } => "fatal",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::Fatal { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "retry_engine"
    }
}
