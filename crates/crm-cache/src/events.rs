use std::time::Instant;

use crm_core::PipelineEvent;

/// Events emitted by [`crate::CacheStore`].
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit { key: String, timestamp: Instant },
    Miss { key: String, timestamp: Instant },
    Write { key: String, bytes: usize, timestamp: Instant },
    Cleared { removed: usize, timestamp: Instant },
}

impl PipelineEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Write { .. } => "write",
            CacheEvent::Cleared { .. } => "cleared",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Write { timestamp, .. }
            | CacheEvent::Cleared { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "cache_store"
    }
}
