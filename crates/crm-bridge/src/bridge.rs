//! The CLI Bridge: invokes the tenant CLI as a subprocess and
//! classifies the result at the boundary.

use crate::classify::{classify, ClassificationRule, DEFAULT_RULES};
use crate::error::BridgeError;
use crm_core::Classification;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for a single subprocess invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period given to a subprocess before it is hard-killed on
/// cancellation.
pub const CANCELLATION_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Captured result of a subprocess invocation, already classified.
///
/// Note there is no `Result`-level error for a non-zero exit: the bridge
/// never throws on a non-zero exit code — a failing command is a normal,
/// fully-populated `BridgeOutcome` whose `classification` is something
/// other than `Ok`.
#[derive(Debug, Clone)]
pub struct BridgeOutcome {
    /// Process exit code, or `None` if the process was killed (e.g. on
    /// timeout) before it could exit normally.
    pub exit_code: Option<i32>,
    /// Captured stdout, as UTF-8 (lossily converted if the CLI emits
    /// invalid UTF-8).
    pub stdout: String,
    /// Captured stderr, as UTF-8 (lossily converted).
    pub stderr: String,
    /// The boundary classification.
    pub classification: Classification,
}

/// Stateless subprocess bridge. Concurrent invocations are safe: each
/// `run` call spawns its own subprocess.
#[derive(Debug, Clone)]
pub struct CliBridge {
    binary: String,
    rules: Vec<ClassificationRule>,
    timeout: Duration,
}

impl CliBridge {
    /// Creates a bridge invoking `binary` on PATH, with the default
    /// classification table and a 300s timeout.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rules: DEFAULT_RULES.to_vec(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the default per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the classification table (e.g. for a tenant CLI whose
    /// error markers differ from the documented defaults).
    pub fn with_rules(mut self, rules: Vec<ClassificationRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Invokes the bridge's binary with `argv`, optionally piping `stdin`,
    /// and classifies the result. Uses this bridge's configured timeout.
    pub async fn run(&self, argv: &[&str], stdin: Option<&str>) -> Result<BridgeOutcome, BridgeError> {
        self.run_with_timeout(argv, stdin, self.timeout).await
    }

    /// As [`CliBridge::run`], but with an explicit per-call timeout.
    pub async fn run_with_timeout(
        &self,
        argv: &[&str],
        stdin: Option<&str>,
        deadline: Duration,
    ) -> Result<BridgeOutcome, BridgeError> {
        let mut command = Command::new(&self.binary);
        command
            .args(argv)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if let Some(input) = stdin {
            if let Some(mut child_stdin) = child.stdin.take() {
                child_stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(BridgeError::StdinWrite)?;
                drop(child_stdin);
            }
        }

        match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let exit_code = output.status.code();
                let classification = classify(exit_code, &stderr, false, &self.rules);

                #[cfg(feature = "tracing")]
                if classification != Classification::Ok {
                    tracing::debug!(
                        binary = %self.binary,
                        argv = ?argv,
                        ?classification,
                        "cli bridge invocation classified"
                    );
                }

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "cli_bridge_invocations_total",
                    "classification" => classification.to_string()
                )
                .increment(1);

                Ok(BridgeOutcome {
                    exit_code,
                    stdout,
                    stderr,
                    classification,
                })
            }
            Ok(Err(source)) => Err(BridgeError::Wait(source)),
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(binary = %self.binary, argv = ?argv, ?deadline, "cli bridge invocation timed out");

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "cli_bridge_invocations_total",
                    "classification" => "timeout"
                )
                .increment(1);

                Ok(BridgeOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    classification: Classification::Timeout,
                })
            }
        }
    }
}
