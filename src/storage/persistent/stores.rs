//! Durable alias store.
//!
//! Reads are served from in-memory tables. Every mutation is appended to the
//! write-ahead log before it is applied; the log is folded into the snapshot
//! on open and whenever it outgrows `max_wal_size`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::alias::{AliasConditions, AliasEntry, Pid, SaveOutcome, SaveRequest};
use crate::error::CtxResult;
use crate::language::LangCode;
use crate::storage::tables::{AliasTables, Invalidation, TableChange};
use crate::storage::traits::{AliasStore, CacheTagInvalidator, StorageError};

use super::codec;
use super::file_lock::FileLock;
use super::snapshot;
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

const WAL_FILE: &str = "aliases.wal";
const SNAPSHOT_FILE: &str = "aliases.snap";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn io_err(context: &str, e: &std::io::Error) -> StorageError {
    if codec::is_serialization_error(e) {
        StorageError::SerializationError(format!("{context}: {e}"))
    } else {
        StorageError::BackendError(format!("{context}: {e}"))
    }
}

/// Alias store persisted in a directory.
///
/// Holds an exclusive lock on the directory for its lifetime.
pub struct PersistentAliasStore {
    dir: PathBuf,
    _lock: FileLock,
    wal: WriteAheadLog,
    tables: RwLock<AliasTables>,
    config: PersistentConfig,
    invalidation: Invalidation,
}

/// Result of a compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Log entries folded into the snapshot.
    pub entries_compacted: u64,
    /// Log size before compaction.
    pub wal_size_before: u64,
    /// Log size after compaction.
    pub wal_size_after: u64,
}

impl PersistentAliasStore {
    /// Open or create a store in `dir`.
    ///
    /// # Errors
    /// - the configuration is out of range
    /// - the directory cannot be created or another handle holds its lock
    /// - the snapshot is unreadable
    pub fn open(dir: impl AsRef<Path>, config: PersistentConfig) -> CtxResult<Self> {
        let config = config.validate()?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_err("failed to create alias directory", &e))?;
        let lock = FileLock::acquire(dir).map_err(|e| io_err("failed to acquire lock", &e))?;

        let mut tables = snapshot::read(&dir.join(SNAPSHOT_FILE))
            .map_err(|e| io_err("failed to read snapshot", &e))?;
        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| io_err("failed to open WAL", &e))?;
        let replayed = replay(&wal, &mut tables)?;

        let store = Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            tables: RwLock::new(tables),
            config,
            invalidation: Invalidation::silent(),
        };
        {
            let tables = store.tables.read().map_err(|_| lock_err("alias.open"))?;
            if store.wal_size()? > codec::HEADER_LEN {
                store.compact_locked(&tables)?;
            }
            tracing::debug!(
                dir = %store.dir.display(),
                records = tables.record_count(),
                replayed,
                "alias store opened"
            );
        }
        Ok(store)
    }

    /// Broadcast `tag` on `sink` after every mutation.
    #[must_use]
    pub fn with_invalidator(mut self, sink: Arc<dyn CacheTagInvalidator>, tag: impl Into<String>) -> Self {
        self.invalidation = Invalidation::new(sink, tag);
        self
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    /// - `BackendError`: If the log file cannot be inspected
    pub fn wal_size(&self) -> Result<u64, StorageError> {
        self.wal
            .size_bytes()
            .map_err(|e| io_err("failed to stat WAL", &e))
    }

    /// Fold the log into the snapshot and truncate it.
    ///
    /// # Errors
    /// - `BackendError`: If the snapshot cannot be written or the log truncated
    /// - `SerializationError`: If the tables cannot be encoded
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.compact"))?;
        self.compact_locked(&tables)
    }

    fn compact_locked(&self, tables: &AliasTables) -> Result<CompactionResult, StorageError> {
        let wal_size_before = self.wal_size()?;
        let entries_compacted = self
            .wal
            .current_sequence()
            .map_err(|e| io_err("failed to read WAL sequence", &e))?;

        snapshot::write(&self.dir.join(SNAPSHOT_FILE), tables)
            .map_err(|e| io_err("failed to write snapshot", &e))?;
        self.wal
            .append(WalEntryKind::Checkpoint {
                up_to_sequence: entries_compacted,
            })
            .map_err(|e| io_err("failed to write checkpoint", &e))?;
        self.wal
            .truncate()
            .map_err(|e| io_err("failed to truncate WAL", &e))?;

        let result = CompactionResult {
            entries_compacted,
            wal_size_before,
            wal_size_after: self.wal_size()?,
        };
        tracing::debug!(
            entries = result.entries_compacted,
            before = result.wal_size_before,
            after = result.wal_size_after,
            "alias log compacted"
        );
        Ok(result)
    }

    /// Log, then apply, one mutation's changes.
    fn commit(&self, tables: &mut AliasTables, changes: Vec<TableChange>) -> Result<(), StorageError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.wal
            .append(WalEntryKind::Batch(changes.clone()))
            .map_err(|e| io_err("failed to append to WAL", &e))?;
        tables.apply_all(changes);

        // The mutation is durable in the log; a failed compaction is retried
        // on the next commit or open.
        if self.wal_size()? > self.config.max_wal_size {
            if let Err(e) = self.compact_locked(tables) {
                tracing::warn!(error = %e, "alias log compaction failed");
            }
        }
        Ok(())
    }
}

/// Apply every readable log entry to `tables`. Replay is idempotent, so a log
/// already covered by the snapshot can be applied again.
fn replay(wal: &WriteAheadLog, tables: &mut AliasTables) -> Result<u64, StorageError> {
    let mut count = 0;
    for entry in wal.entries().map_err(|e| io_err("failed to iterate WAL", &e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(after = count, error = %e, "stopping WAL replay at corrupt entry");
                break;
            }
        };
        if let WalEntryKind::Batch(changes) = entry.kind {
            tables.apply_all(changes);
        }
        count += 1;
    }
    Ok(count)
}

impl AliasStore for PersistentAliasStore {
    fn save(&self, request: SaveRequest) -> Result<SaveOutcome, StorageError> {
        let outcome = {
            let mut tables = self.tables.write().map_err(|_| lock_err("alias.save"))?;
            let (outcome, changes) = tables.plan_save(&request)?;
            self.commit(&mut tables, changes)?;
            outcome
        };
        tracing::debug!(
            pid = %outcome.record.pid,
            operation = ?outcome.operation,
            "alias saved"
        );
        self.invalidation.fire();
        Ok(outcome)
    }

    fn load(&self, conditions: &AliasConditions) -> Result<Option<AliasEntry>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.load"))?;
        Ok(tables.load(conditions))
    }

    fn load_all(
        &self,
        conditions: &AliasConditions,
    ) -> Result<BTreeMap<Pid, AliasEntry>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.load_all"))?;
        Ok(tables.load_all(conditions))
    }

    fn delete(&self, conditions: &AliasConditions) -> Result<usize, StorageError> {
        let deleted = {
            let mut tables = self.tables.write().map_err(|_| lock_err("alias.delete"))?;
            let changes = tables.plan_delete(conditions);
            let deleted = changes.len();
            self.commit(&mut tables, changes)?;
            deleted
        };
        tracing::debug!(deleted, "aliases deleted");
        self.invalidation.fire();
        Ok(deleted)
    }

    fn lookup_path_alias(
        &self,
        path: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.lookup_path_alias"))?;
        Ok(tables.lookup_path_alias(path, langcode, contexts_path))
    }

    fn lookup_path_source(
        &self,
        alias: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.lookup_path_source"))?;
        Ok(tables.lookup_path_source(alias, langcode, contexts_path))
    }

    fn preload_path_alias(
        &self,
        paths: &BTreeSet<String>,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.preload_path_alias"))?;
        Ok(tables.preload_path_alias(paths, langcode, contexts_path))
    }

    fn alias_exists(
        &self,
        alias: &str,
        langcode: &LangCode,
        source: Option<&str>,
        contexts_path: Option<&str>,
    ) -> Result<bool, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.alias_exists"))?;
        Ok(tables.alias_exists(alias, langcode, source, contexts_path))
    }

    fn language_alias_exists(&self) -> Result<bool, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.language_alias_exists"))?;
        Ok(tables.language_alias_exists())
    }

    fn list_aliases(
        &self,
        filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AliasEntry>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.list_aliases"))?;
        tables.list_aliases(filter, offset, limit)
    }

    fn top_level_segments(&self) -> Result<BTreeSet<String>, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.top_level_segments"))?;
        Ok(tables.top_level_segments())
    }
}

impl std::fmt::Debug for PersistentAliasStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentAliasStore")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
