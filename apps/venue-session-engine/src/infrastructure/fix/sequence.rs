//! Outbound Sequence Store
//!
//! Durable counter holding the next outbound MsgSeqNum. The session persists
//! the value before each socket write and reloads it on startup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// First sequence number of a fresh session.
pub const INITIAL_SEQUENCE: u64 = 1;

/// Sequence store failures.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Reading or writing the backing file failed.
    #[error("sequence file {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stored value is not a positive integer.
    #[error("sequence file {path} holds an invalid value '{value}'")]
    Corrupt {
        /// File being read.
        path: PathBuf,
        /// Offending contents.
        value: String,
    },

    /// Injected failure (tests).
    #[error("sequence store unavailable")]
    Unavailable,
}

/// Durable next-outbound-sequence counter.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Load the stored value, or [`INITIAL_SEQUENCE`] if nothing is stored.
    async fn load(&self) -> Result<u64, SequenceError>;

    /// Overwrite the stored value.
    async fn persist(&self, next_seq: u64) -> Result<(), SequenceError>;
}

// =============================================================================
// File Store
// =============================================================================

/// Stores the counter as a single decimal integer in a text file.
///
/// Writes go to a sibling temp file that is synced and renamed over the
/// target, so a crash leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileSequenceStore {
    path: PathBuf,
}

impl FileSequenceStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> SequenceError {
        SequenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SequenceStore for FileSequenceStore {
    async fn load(&self) -> Result<u64, SequenceError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No sequence file, starting at 1");
                return Ok(INITIAL_SEQUENCE);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(INITIAL_SEQUENCE);
        }
        trimmed
            .parse::<u64>()
            .ok()
            .filter(|seq| *seq >= INITIAL_SEQUENCE)
            .ok_or_else(|| SequenceError::Corrupt {
                path: self.path.clone(),
                value: trimmed.to_string(),
            })
    }

    async fn persist(&self, next_seq: u64) -> Result<(), SequenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(format!("{next_seq}\n").as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile store with a switch that makes `persist` fail.
#[derive(Debug)]
pub struct InMemorySequenceStore {
    value: AtomicU64,
    fail_persist: AtomicBool,
    persist_count: AtomicU64,
}

impl Default for InMemorySequenceStore {
    fn default() -> Self {
        Self::new(INITIAL_SEQUENCE)
    }
}

impl InMemorySequenceStore {
    /// Store starting at `next_seq`.
    #[must_use]
    pub const fn new(next_seq: u64) -> Self {
        Self {
            value: AtomicU64::new(next_seq),
            fail_persist: AtomicBool::new(false),
            persist_count: AtomicU64::new(0),
        }
    }

    /// Make subsequent `persist` calls fail (or succeed again).
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Last persisted value.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Successful `persist` calls so far.
    #[must_use]
    pub fn persist_count(&self) -> u64 {
        self.persist_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn load(&self) -> Result<u64, SequenceError> {
        Ok(self.current())
    }

    async fn persist(&self, next_seq: u64) -> Result<(), SequenceError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(SequenceError::Unavailable);
        }
        self.value.store(next_seq, Ordering::SeqCst);
        self.persist_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_initial_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSequenceStore::new(dir.path().join("pricing.seq"));
        assert_eq!(store.load().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persisted_value_survives_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("trading.seq");

        FileSequenceStore::new(&path).persist(42).await.unwrap();
        let reopened = FileSequenceStore::new(&path);

        assert_eq!(reopened.load().await.unwrap(), 42);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "42");
        assert!(!reopened.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.seq");
        std::fs::write(&path, "not-a-number").unwrap();

        let err = FileSequenceStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SequenceError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn zero_is_rejected_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.seq");
        std::fs::write(&path, "0\n").unwrap();

        assert!(FileSequenceStore::new(&path).load().await.is_err());
    }

    #[tokio::test]
    async fn in_memory_failure_switch_keeps_old_value() {
        let store = InMemorySequenceStore::new(7);
        store.set_fail_persist(true);
        assert!(store.persist(8).await.is_err());
        assert_eq!(store.current(), 7);

        store.set_fail_persist(false);
        store.persist(8).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 8);
        assert_eq!(store.persist_count(), 1);
    }
}
