//! The Progress & Resume Store.
//!
//! Per-object, per-phase state lives in memory behind a `std::sync::RwLock`
//! so reads never wait on the write path. Writes are serialized through a single writer task fed by an
//! mpsc queue, mirroring the cache store's write-temp-fsync-rename
//! atomicity (`crm_cache::store::CacheStore::put`) but applied to the
//! whole table on every transition, since the store's unit of durability
//! is the full progress file, not a per-key entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crm_core::EventListeners;

use crate::error::ProgressError;
use crate::events::ProgressEvent;
use crate::phase::Phase;
use crate::record::{ProgressRecord, ProgressState};

type Table = HashMap<(String, Phase), ProgressRecord>;

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    object_ref: String,
    phase: Phase,
    state: ProgressState,
    last_attempt_at: DateTime<Utc>,
    #[serde(default)]
    error: Option<String>,
}

enum Command {
    Mark {
        object_ref: String,
        phase: Phase,
        state: ProgressState,
        error: Option<String>,
        ack: oneshot::Sender<Result<(), ProgressError>>,
    },
    Flush {
        ack: oneshot::Sender<Result<(), ProgressError>>,
    },
}

/// File-backed progress tracking, one JSON file per run directory.
pub struct ProgressStore {
    table: Arc<RwLock<Table>>,
    sender: mpsc::Sender<Command>,
}

impl ProgressStore {
    /// Opens (or creates) the progress file at `path`, seeding the
    /// in-memory table from whatever is already on disk so a resumed run
    /// sees prior state immediately.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        Self::with_listeners(path, EventListeners::new()).await
    }

    pub async fn with_listeners(
        path: impl Into<PathBuf>,
        listeners: EventListeners<ProgressEvent>,
    ) -> Result<Self, ProgressError> {
        let path = path.into();
        let initial = load(&path).await?;
        let table = Arc::new(RwLock::new(initial));
        let (sender, receiver) = mpsc::channel(256);

        tokio::spawn(run_writer(
            Arc::clone(&table),
            path,
            listeners,
            receiver,
        ));

        Ok(Self { table, sender })
    }

    /// Records a state transition for `object_ref` at `phase`, persisting
    /// the whole table before returning.
    pub async fn mark(
        &self,
        object_ref: impl Into<String>,
        phase: Phase,
        state: ProgressState,
        error: Option<String>,
    ) -> Result<(), ProgressError> {
        let (ack, done) = oneshot::channel();
        let command = Command::Mark {
            object_ref: object_ref.into(),
            phase,
            state,
            error,
            ack,
        };
        if self.sender.send(command).await.is_err() {
            return Err(ProgressError::Corrupt {
                path: "<writer task stopped>".to_string(),
            });
        }
        done.await.unwrap_or_else(|_| {
            Err(ProgressError::Corrupt {
                path: "<writer task stopped>".to_string(),
            })
        })
    }

    /// Lock-free (relative to the writer queue) snapshot read.
    pub fn get(&self, object_ref: &str, phase: Phase) -> Option<ProgressRecord> {
        self.table
            .read()
            .expect("progress table lock poisoned")
            .get(&(object_ref.to_string(), phase))
            .cloned()
    }

    /// Refs known to need (re)processing at `phase`: anything not marked
    /// `Done`. Refs never seen by the store aren't returned here; the
    /// Orchestrator seeds those from a fresh enumeration instead.
    pub fn pending(&self, phase: Phase) -> Vec<String> {
        self.table
            .read()
            .expect("progress table lock poisoned")
            .iter()
            .filter(|((_, p), record)| *p == phase && record.needs_processing())
            .map(|((object_ref, _), _)| object_ref.clone())
            .collect()
    }

    /// `pending(phase)` is empty: the phase is complete.
    pub fn is_phase_complete(&self, phase: Phase) -> bool {
        self.pending(phase).is_empty()
    }

    /// Blocks until every previously queued `mark` has been persisted.
    /// Used on cancellation paths even though `mark` already
    /// awaits its own durability, since a flush gives a single barrier
    /// across many outstanding marks issued without awaiting each one.
    pub async fn flush(&self) -> Result<(), ProgressError> {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush { ack }).await.is_err() {
            return Err(ProgressError::Corrupt {
                path: "<writer task stopped>".to_string(),
            });
        }
        done.await.unwrap_or_else(|_| {
            Err(ProgressError::Corrupt {
                path: "<writer task stopped>".to_string(),
            })
        })
    }
}

async fn run_writer(
    table: Arc<RwLock<Table>>,
    path: PathBuf,
    listeners: EventListeners<ProgressEvent>,
    mut receiver: mpsc::Receiver<Command>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Mark {
                object_ref,
                phase,
                state,
                error,
                ack,
            } => {
                let record = ProgressRecord {
                    state,
                    last_attempt_at: Utc::now(),
                    error,
                };
                {
                    let mut guard = table.write().expect("progress table lock poisoned");
                    guard.insert((object_ref.clone(), phase), record);
                }
                let result = persist(&path, &table).await;
                listeners.emit(&ProgressEvent::marked(object_ref, phase, state));
                let _ = ack.send(result);
            }
            Command::Flush { ack } => {
                let result = persist(&path, &table).await;
                listeners.emit(&ProgressEvent::flushed());
                let _ = ack.send(result);
            }
        }
    }
}

async fn persist(path: &Path, table: &Arc<RwLock<Table>>) -> Result<(), ProgressError> {
    let records: Vec<PersistedRecord> = {
        let guard = table.read().expect("progress table lock poisoned");
        guard
            .iter()
            .map(|((object_ref, phase), record)| PersistedRecord {
                object_ref: object_ref.clone(),
                phase: *phase,
                state: record.state,
                last_attempt_at: record.last_attempt_at,
                error: record.error.clone(),
            })
            .collect()
    };

    let encoded = serde_json::to_vec(&records).map_err(|_| ProgressError::Corrupt {
        path: path.display().to_string(),
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ProgressError::Io {
                path: parent.display().to_string(),
                source,
            })?;
    }

    let tmp_path = path.with_extension(format!("json.tmp-{}", std::process::id()));
    let file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|source| ProgressError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
    write_and_sync(file, &encoded)
        .await
        .map_err(|source| ProgressError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| ProgressError::Io {
            path: path.display().to_string(),
            source,
        })?;

    Ok(())
}

async fn load(path: &Path) -> Result<Table, ProgressError> {
    let raw = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => {
            return Err(ProgressError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let records: Vec<PersistedRecord> =
        serde_json::from_slice(&raw).map_err(|_| ProgressError::Corrupt {
            path: path.display().to_string(),
        })?;

    Ok(records
        .into_iter()
        .map(|r| {
            (
                (r.object_ref, r.phase),
                ProgressRecord {
                    state: r.state,
                    last_attempt_at: r.last_attempt_at,
                    error: r.error,
                },
            )
        })
        .collect())
}

async fn write_and_sync(mut file: tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn mark_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.json"))
            .await
            .unwrap();

        store
            .mark("Account", Phase::Describe, ProgressState::Done, None)
            .await
            .unwrap();

        let record = store.get("Account", Phase::Describe).unwrap();
        assert_eq!(record.state, ProgressState::Done);
    }

    #[tokio::test]
    async fn pending_excludes_done_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.json"))
            .await
            .unwrap();

        store
            .mark("Account", Phase::Describe, ProgressState::Pending, None)
            .await
            .unwrap();
        store
            .mark("Contact", Phase::Describe, ProgressState::Done, None)
            .await
            .unwrap();

        let pending = store.pending(Phase::Describe);
        assert_eq!(pending, vec!["Account".to_string()]);
        assert!(!store.is_phase_complete(Phase::Describe));
    }

    #[tokio::test]
    async fn phase_completes_once_every_ref_is_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.json"))
            .await
            .unwrap();

        store
            .mark("Account", Phase::Describe, ProgressState::Done, None)
            .await
            .unwrap();

        assert!(store.is_phase_complete(Phase::Describe));
    }

    #[tokio::test]
    async fn error_state_carries_a_message_and_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.json"))
            .await
            .unwrap();

        store
            .mark(
                "Account",
                Phase::Describe,
                ProgressState::Error,
                Some("transport_error".to_string()),
            )
            .await
            .unwrap();

        let record = store.get("Account", Phase::Describe).unwrap();
        assert_eq!(record.state, ProgressState::Error);
        assert_eq!(record.error.as_deref(), Some("transport_error"));
        assert_eq!(store.pending(Phase::Describe), vec!["Account".to_string()]);
    }

    #[tokio::test]
    async fn reopening_the_store_resumes_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");

        {
            let store = ProgressStore::open(&path).await.unwrap();
            store
                .mark("Account", Phase::Describe, ProgressState::Done, None)
                .await
                .unwrap();
        }

        let reopened = ProgressStore::open(&path).await.unwrap();
        let record = reopened.get("Account", Phase::Describe).unwrap();
        assert_eq!(record.state, ProgressState::Done);
    }

    #[tokio::test]
    async fn flush_waits_for_outstanding_marks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.json"))
            .await
            .unwrap();

        store
            .mark("Account", Phase::Describe, ProgressState::Done, None)
            .await
            .unwrap();
        store.flush().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(store.get("Account", Phase::Describe).is_some());
    }
}
