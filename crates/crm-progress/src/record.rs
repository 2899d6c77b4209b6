use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ref's progress through a phase. Progress records monotonically
/// advance from `pending` → `in_flight` → `done` (or `error`, which is
/// retryable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Pending,
    InFlight,
    Done,
    Error,
}

impl ProgressState {
    /// Whether advancing from `self` to `next` respects the monotonic
    /// lifecycle. `Error` may retry back into `Pending`.
    pub fn can_advance_to(self, next: ProgressState) -> bool {
        use ProgressState::*;
        if next == self {
            return true;
        }
        matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, Done)
                | (InFlight, Error)
                | (Error, Pending)
                | (Error, InFlight)
        )
    }
}

/// Per-object, per-phase progress. `done` is represented as `state == Done` rather than a
/// separate boolean, since the lifecycle has four states, not two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub state: ProgressState,
    pub last_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressRecord {
    pub fn is_done(&self) -> bool {
        self.state == ProgressState::Done
    }

    pub fn needs_processing(&self) -> bool {
        self.state != ProgressState::Done
    }
}
