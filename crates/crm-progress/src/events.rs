use std::time::Instant;

use crm_core::PipelineEvent;

use crate::phase::Phase;
use crate::record::ProgressState;

/// Observability events for the Progress & Resume Store.
#[derive(Debug)]
pub enum ProgressEvent {
    Marked {
        object_ref: String,
        phase: Phase,
        state: ProgressState,
        timestamp: Instant,
    },
    Flushed {
        timestamp: Instant,
    },
}

impl ProgressEvent {
    pub fn marked(object_ref: impl Into<String>, phase: Phase, state: ProgressState) -> Self {
        ProgressEvent::Marked {
            object_ref: object_ref.into(),
            phase,
            state,
            timestamp: Instant::now(),
        }
    }

    pub fn flushed() -> Self {
        ProgressEvent::Flushed {
            timestamp: Instant::now(),
        }
    }
}

impl PipelineEvent for ProgressEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::Marked { .. } => "progress_marked",
            ProgressEvent::Flushed { .. } => "progress_flushed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ProgressEvent::Marked { timestamp, .. } => *timestamp,
            ProgressEvent::Flushed { timestamp } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "progress_store"
    }
}
