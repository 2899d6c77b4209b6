//! Error type surfaced by a failed bridge invocation itself (process spawn
//! failures, not the command's own exit classification).

use thiserror::Error;

/// Failure to even run the subprocess — distinct from the command running
/// and being classified as an error. This only covers spawn-level failures (binary not found, I/O
/// error writing stdin, etc).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The subprocess could not be spawned.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        /// The binary that failed to spawn.
        binary: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing to the child's stdin failed.
    #[error("failed to write stdin: {0}")]
    StdinWrite(#[source] std::io::Error),
    /// Waiting for the child process failed.
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}
