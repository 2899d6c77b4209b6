//! The directory-backed Cache Store.
//!
//! Reads and writes are keyed by [`CacheKey`] and land in `dir/<key>.cache`.
//! Writes go to a sibling temp file, get `fsync`'d, then are renamed into
//! place, so a reader never observes a partial entry. Per-key locking (so the
//! second concurrent caller for the same key blocks on the first rather
//! than duplicating the fetch) uses the same `parking_lot::Mutex` +
//! `hashbrown::HashMap` in-flight bookkeeping idiom as
//! `tower_resilience_coalesce::service::InFlight`, generalized from a
//! broadcast-channel join to a plain async mutex since the store has no
//! "leading vs. joining" distinction to make — callers simply re-check the
//! file after acquiring the lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crm_core::EventListeners;

use crate::entry::{decode, encode};
use crate::error::CacheError;
use crate::events::CacheEvent;
use crate::key::CacheKey;
use crate::stats::{CacheStats, CacheStatsSnapshot};

/// Default time-to-live for cache entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A fetched cache entry, decompressed and TTL/schema-checked.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub payload: Vec<u8>,
    pub data_type: String,
}

pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    schema_version: u32,
    stats: CacheStats,
    listeners: EventListeners<CacheEvent>,
    key_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheStore {
    /// Opens (creating if absent) a cache store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, schema_version: u32) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            schema_version,
            stats: CacheStats::default(),
            listeners: EventListeners::new(),
            key_locks: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn with_listeners(mut self, listeners: EventListeners<CacheEvent>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.cache"))
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock();
        locks
            .entry(key.to_hex())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Looks up `key`. Returns `None` on a miss: file absent, aged out
    /// (age >= ttl), or written under a different schema_version.
    ///
    /// The second concurrent caller for the same key blocks here until the
    /// first caller's `get` (or `put`) completes, then re-checks the file.
    pub async fn get(&self, key: CacheKey) -> Result<Option<CacheHit>, CacheError> {
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let path = self.path_for(&key);
        let raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.stats.record_miss();
                self.listeners.emit(&CacheEvent::Miss {
                    key: key.to_hex(),
                    timestamp: std::time::Instant::now(),
                });
                return Ok(None);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let Some(decoded) = decode(&raw) else {
            return Err(CacheError::CorruptHeader {
                path: path.display().to_string(),
            });
        };

        let age = Duration::from_millis(
            now_millis().saturating_sub(decoded.header.created_at_millis),
        );
        let expired = age >= self.ttl;
        let schema_mismatch = decoded.header.schema_version != self.schema_version;

        if expired || schema_mismatch {
            let _ = tokio::fs::remove_file(&path).await;
            self.stats.record_miss();
            self.listeners.emit(&CacheEvent::Miss {
                key: key.to_hex(),
                timestamp: std::time::Instant::now(),
            });
            return Ok(None);
        }

        self.stats.record_hit();
        self.listeners.emit(&CacheEvent::Hit {
            key: key.to_hex(),
            timestamp: std::time::Instant::now(),
        });

        Ok(Some(CacheHit {
            payload: decoded.payload,
            data_type: decoded.header.data_type,
        }))
    }

    /// Writes `payload` for `key`, atomically (write-to-temp, fsync, rename).
    pub async fn put(
        &self,
        key: CacheKey,
        data_type: &str,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;

        let (encoded, compressed) = encode(data_type, self.schema_version, payload);
        let final_path = self.path_for(&key);
        let tmp_path = self.dir.join(format!("{key}.cache.tmp-{}", std::process::id()));

        let file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
        write_and_sync(file, &encoded)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|source| CacheError::Io {
                path: final_path.display().to_string(),
                source,
            })?;

        let bytes_saved = if compressed {
            payload.len().saturating_sub(encoded.len()) as u64
        } else {
            0
        };
        self.stats.record_write(bytes_saved);
        self.listeners.emit(&CacheEvent::Write {
            key: key.to_hex(),
            bytes: encoded.len(),
            timestamp: std::time::Instant::now(),
        });

        Ok(())
    }

    /// Selective clear: removes every entry matching `data_type`
    /// (if given) and older than `older_than` (if given). Passing neither
    /// clears everything and resets the stats counters.
    pub async fn clear(
        &self,
        data_type: Option<&str>,
        older_than: Option<Duration>,
    ) -> Result<usize, CacheError> {
        let clears_everything = data_type.is_none() && older_than.is_none();
        let mut removed = 0usize;

        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(0);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.display().to_string(),
                    source,
                })
            }
        };

        while let Some(entry) = read_dir.next_entry().await.map_err(|source| CacheError::Io {
            path: self.dir.display().to_string(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("cache") {
                continue;
            }

            if should_remove(&path, data_type, older_than).await {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }

        if clears_everything {
            self.stats.reset();
        }

        self.listeners.emit(&CacheEvent::Cleared {
            removed,
            timestamp: std::time::Instant::now(),
        });

        Ok(removed)
    }
}

async fn should_remove(path: &Path, data_type: Option<&str>, older_than: Option<Duration>) -> bool {
    let Ok(raw) = tokio::fs::read(path).await else {
        return false;
    };
    let Some(decoded) = decode(&raw) else {
        return false;
    };

    if let Some(wanted) = data_type {
        if decoded.header.data_type != wanted {
            return false;
        }
    }

    if let Some(threshold) = older_than {
        let age = Duration::from_millis(now_millis().saturating_sub(decoded.header.created_at_millis));
        if age < threshold {
            return false;
        }
    }

    true
}

async fn write_and_sync(mut file: tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
