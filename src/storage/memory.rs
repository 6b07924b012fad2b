//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{Duration, Utc};

use crate::alias::{AliasConditions, AliasEntry, Pid, SaveOutcome, SaveRequest};
use crate::language::LangCode;
use crate::storage::tables::{AliasTables, Invalidation};
use crate::storage::traits::{
    AliasStore, CacheBackend, CacheItem, CacheTagInvalidator, StorageError,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory alias store.
///
/// A single write lock covers each mutation, so a save or a cascading delete
/// is never observed half-applied.
#[derive(Debug)]
pub struct InMemoryAliasStore {
    tables: RwLock<AliasTables>,
    invalidation: Invalidation,
}

impl Default for InMemoryAliasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAliasStore {
    /// Create an empty store that broadcasts no invalidations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(AliasTables::default()),
            invalidation: Invalidation::silent(),
        }
    }

    /// Create an empty store that invalidates `tag` on `sink` after every mutation.
    #[must_use]
    pub fn with_invalidator(sink: Arc<dyn CacheTagInvalidator>, tag: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(AliasTables::default()),
            invalidation: Invalidation::new(sink, tag),
        }
    }

    /// Number of alias records.
    ///
    /// # Errors
    /// - `BackendError`: If the table lock is poisoned
    pub fn len(&self) -> Result<usize, StorageError> {
        let tables = self.tables.read().map_err(|_| lock_err("alias.len"))?;
        Ok(tables.record_count())
    }

    /// Whether the store holds no records.
    ///
    /// # Errors
    /// - `BackendError`: If the table lock is poisoned
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl AliasStore for InMemoryAliasStore {
    fn save(&self, request: SaveRequest) -> Result<SaveOutcome, StorageError> {
        let outcome = {
            let mut tables = self.tables.write().map_err(|_| lock_err("alias.save"))?;
            let (outcome, changes) = tables.plan_save(&request)?;
            tables.apply_all(changes);
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
            tables.apply_all(changes);
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

/// Thread-safe in-memory cache backend with TTL expiry.
///
/// Expired items read as misses and are dropped on the next write.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    items: RwLock<HashMap<String, CacheItem>>,
}

impl InMemoryCacheBackend {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live items.
    ///
    /// # Errors
    /// - `BackendError`: If the item lock is poisoned
    pub fn len(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let items = self.items.read().map_err(|_| lock_err("cache.len"))?;
        Ok(items.values().filter(|item| !item.is_expired(now)).count())
    }

    /// Whether no live item is held.
    ///
    /// # Errors
    /// - `BackendError`: If the item lock is poisoned
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<CacheItem>, StorageError> {
        let now = Utc::now();
        let items = self.items.read().map_err(|_| lock_err("cache.get"))?;
        Ok(items.get(key).filter(|item| !item.is_expired(now)).cloned())
    }

    fn set(&self, key: &str, data: serde_json::Value, ttl: Duration) -> Result<(), StorageError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            StorageError::BackendError(format!("cache ttl out of range: {ttl}"))
        })?;
        let mut items = self.items.write().map_err(|_| lock_err("cache.set"))?;
        items.retain(|_, item| !item.is_expired(now));
        items.insert(key.to_string(), CacheItem { data, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| lock_err("cache.delete"))?;
        items.remove(key);
        Ok(())
    }
}

/// Invalidation sink that counts how often each tag was invalidated.
#[derive(Debug, Default)]
pub struct TagLedger {
    counts: Mutex<HashMap<String, u64>>,
}

impl TagLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `tag` has been invalidated.
    #[must_use]
    pub fn count(&self, tag: &str) -> u64 {
        self.counts
            .lock()
            .map_or(0, |counts| counts.get(tag).copied().unwrap_or(0))
    }
}

impl CacheTagInvalidator for TagLedger {
    fn invalidate_tags(&self, tags: &[&str]) {
        let Ok(mut counts) = self.counts.lock() else {
            tracing::error!("poisoned lock: tag ledger");
            return;
        };
        for tag in tags {
            *counts.entry((*tag).to_string()).or_insert(0) += 1;
        }
    }
}
