//! Abstract storage traits for ctxalias.
//!
//! These traits define the contract that backends must implement:
//! - [`AliasStore`]: alias records and their context associations
//! - [`CacheBackend`]: the shared key/value store holding preload sets
//! - [`CacheTagInvalidator`]: the sink notified on every alias mutation
//!
//! Lookups return `Ok(None)` for "definitely absent" and `Err` only when the
//! backend failed, so callers can choose to degrade or escalate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alias::{AliasConditions, AliasEntry, Pid, SaveOutcome, SaveRequest};
use crate::language::LangCode;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Update targeted a pid that does not exist.
    #[error("Alias not found: pid {0}")]
    PidNotFound(Pid),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Storage trait for alias records.
///
/// # Language fallback
/// Lookups for a specific language see rows in that language and
/// language-neutral (`und`) rows, preferring the specific ones. Lookups for
/// `und` see only neutral rows.
///
/// # Context scoping
/// A `contexts_path` restricts results to records associated with exactly
/// that path. `None` applies no restriction.
///
/// # Safety Considerations
/// - A record and all of its associations are removed together
/// - Implementations should handle concurrent access safely
pub trait AliasStore: Send + Sync {
    /// Insert or update a record, and optionally attach or rename a scope.
    ///
    /// # Errors
    /// - `PidNotFound`: the request updates a pid that does not exist
    fn save(&self, request: SaveRequest) -> Result<SaveOutcome, StorageError>;

    /// The matching record with the highest pid.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn load(&self, conditions: &AliasConditions) -> Result<Option<AliasEntry>, StorageError>;

    /// Every matching record, keyed by pid.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn load_all(
        &self,
        conditions: &AliasConditions,
    ) -> Result<BTreeMap<Pid, AliasEntry>, StorageError>;

    /// Delete matching records with their associations. Returns how many
    /// records were removed.
    ///
    /// # Errors
    /// - `BackendError`: If the deletion cannot be recorded
    fn delete(&self, conditions: &AliasConditions) -> Result<usize, StorageError>;

    /// Alias for a source path. Newest record wins among equally preferred rows.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn lookup_path_alias(
        &self,
        path: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError>;

    /// Source path for an alias. Newest record wins among equally preferred rows.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn lookup_path_source(
        &self,
        alias: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError>;

    /// Aliases for many source paths in one call, keyed by the requested path.
    /// Oldest record wins among equally preferred rows so repeated preloads of
    /// a page stay stable. Paths without an alias are absent from the result.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn preload_path_alias(
        &self,
        paths: &BTreeSet<String>,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<BTreeMap<String, String>, StorageError>;

    /// Whether `alias` is taken, optionally ignoring records for `source`.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn alias_exists(
        &self,
        alias: &str,
        langcode: &LangCode,
        source: Option<&str>,
        contexts_path: Option<&str>,
    ) -> Result<bool, StorageError>;

    /// Whether any record has a specific (non-neutral) language.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn language_alias_exists(&self) -> Result<bool, StorageError>;

    /// A page of records ordered by alias. `filter` matches anywhere in the
    /// alias, case-insensitively, with `*` as a wildcard.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read or `filter` does not
    ///   compile to a pattern
    fn list_aliases(
        &self,
        filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AliasEntry>, StorageError>;

    /// Distinct first segments of every source path.
    ///
    /// # Errors
    /// - `BackendError`: If the backend cannot be read
    fn top_level_segments(&self) -> Result<BTreeSet<String>, StorageError>;
}

/// A value held by a [`CacheBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Stored payload.
    pub data: serde_json::Value,
    /// Instant after which the item is treated as absent.
    pub expires_at: DateTime<Utc>,
}

impl CacheItem {
    /// Whether the item has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared key/value cache. Writes are last-writer-wins.
pub trait CacheBackend: Send + Sync {
    /// Fetch a live item.
    ///
    /// # Errors
    /// - `BackendError` / `ConnectionError`: If the cache cannot be reached
    fn get(&self, key: &str) -> Result<Option<CacheItem>, StorageError>;

    /// Store `data` under `key` for `ttl`.
    ///
    /// # Errors
    /// - `BackendError` / `ConnectionError`: If the write is rejected
    fn set(&self, key: &str, data: serde_json::Value, ttl: Duration) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    /// - `BackendError` / `ConnectionError`: If the cache cannot be reached
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Receives cache tag invalidations.
pub trait CacheTagInvalidator: Send + Sync {
    /// Invalidate every cache entry carrying one of `tags`.
    fn invalidate_tags(&self, tags: &[&str]);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_alias_store_object_safe(_: &dyn AliasStore) {}
    fn _assert_cache_backend_object_safe(_: &dyn CacheBackend) {}
    fn _assert_invalidator_object_safe(_: &dyn CacheTagInvalidator) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::PidNotFound(Pid::new(7));
        assert!(err.to_string().contains("pid 7"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_cache_item_expiry() {
        let now = Utc::now();
        let item = CacheItem {
            data: serde_json::Value::Null,
            expires_at: now,
        };
        assert!(item.is_expired(now));
        assert!(!item.is_expired(now - Duration::seconds(1)));
    }
}
