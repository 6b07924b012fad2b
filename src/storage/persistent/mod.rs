//! Durable alias backend.
//!
//! Provides crash-safe storage with:
//! - Write-ahead logging of every mutation
//! - An exclusive directory lock for single-process access
//! - CRC32 checksums on every log and snapshot frame
//! - Snapshot compaction once the log grows past `max_wal_size`
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── .lock           exclusive lock (flock / LockFileEx)
//! ├── aliases.snap    compacted tables
//! └── aliases.wal     mutations since the snapshot
//! ```

mod codec;
mod file_lock;
mod snapshot;
mod stores;
mod wal;

pub use file_lock::FileLock;
pub use stores::{CompactionResult, PersistentAliasStore};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CtxResult, ValidationError};

/// Configuration for the durable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Log size that triggers compaction (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024, // 64 MB
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024; // 4 KiB minimum to avoid degenerate compaction loops

    /// Checks value ranges, returning the config unchanged on success.
    ///
    /// # Errors
    /// - `InvalidConfig`: If `max_wal_size` is below the minimum
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                field: "max_wal_size".to_string(),
                reason: format!(
                    "must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}

/// Open or create an alias store at `path`, with defaults when `config` is `None`.
///
/// # Errors
/// - `Validation`: If `config` is out of range
/// - `Storage`: If the directory cannot be locked or its files cannot be read
///
/// # Example
/// ```rust,no_run
/// use ctxalias::storage::persistent::open_store;
/// use ctxalias::{AliasStore, SaveRequest};
///
/// let store = open_store("./aliases", None)?;
/// store.save(SaveRequest::new("/node/1", "/about")?)?;
/// # Ok::<(), ctxalias::CtxError>(())
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> CtxResult<PersistentAliasStore> {
    PersistentAliasStore::open(path, config.unwrap_or_default())
}
