//! Per-request layered alias lookup.
//!
//! Lookups are partitioned by [`MapKey`]. Within a partition the cache keeps
//! positive memos in both directions (`path -> alias` and `alias -> path`),
//! negative memos in both directions, and
//! the preload set read from the [`CacheBackend`] for the current page. The
//! first `get_alias_by_path` call per partition resolves the whole preload
//! set in one storage call; later calls are served from the memos.
//!
//! Storage failures are logged and resolve to the input unchanged. They are
//! never memoized, so the next call retries.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration;

use super::map_key::MapKey;
use super::whitelist::{top_level_segment, AliasWhitelist};
use crate::config::ContextsConfig;
use crate::error::ValidationError;
use crate::language::LangCode;
use crate::storage::{AliasStore, CacheBackend};

/// Preload sets as persisted in the cache backend.
type PreloadSets = BTreeMap<MapKey, BTreeSet<String>>;

/// Layered alias cache for one request.
///
/// Never share an instance between requests; build a fresh one per request.
pub struct AliasCache {
    store: Arc<dyn AliasStore>,
    backend: Arc<dyn CacheBackend>,
    whitelist: Arc<dyn AliasWhitelist>,
    current_language: LangCode,
    ttl: Duration,
    key_prefix: String,
    cache_key: Option<String>,
    cache_needs_writing: bool,
    preloaded: Option<PreloadSets>,
    initialized: HashSet<MapKey>,
    lookup_map: HashMap<MapKey, BTreeMap<String, String>>,
    path_map: HashMap<MapKey, HashMap<String, String>>,
    no_path: HashMap<MapKey, HashSet<String>>,
    no_alias: HashMap<MapKey, HashSet<String>>,
}

impl AliasCache {
    /// Create an empty cache for a request in `current_language`.
    #[must_use]
    pub fn new(
        store: Arc<dyn AliasStore>,
        backend: Arc<dyn CacheBackend>,
        whitelist: Arc<dyn AliasWhitelist>,
        config: &ContextsConfig,
        current_language: LangCode,
    ) -> Self {
        Self {
            store,
            backend,
            whitelist,
            current_language,
            ttl: config.preload_ttl(),
            key_prefix: config.preload_key_prefix.clone(),
            cache_key: None,
            cache_needs_writing: false,
            preloaded: None,
            initialized: HashSet::new(),
            lookup_map: HashMap::new(),
            path_map: HashMap::new(),
            no_path: HashMap::new(),
            no_alias: HashMap::new(),
        }
    }

    /// Language used when a lookup names none.
    #[must_use]
    pub fn current_language(&self) -> &LangCode {
        &self.current_language
    }

    /// Set the page whose preload set this request reads and writes.
    pub fn set_cache_key(&mut self, key: &str) {
        self.cache_key = Some(format!("{}{key}", self.key_prefix));
    }

    /// The full backend key, once set.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Whether [`Self::write_cache`] has something to persist.
    #[must_use]
    pub fn cache_needs_writing(&self) -> bool {
        self.cache_needs_writing
    }

    /// Source path for `alias`, or `alias` itself when it has none.
    pub fn get_path_by_alias(
        &mut self,
        alias: &str,
        langcode: Option<&LangCode>,
        contexts_path: Option<&str>,
    ) -> String {
        let langcode = langcode.unwrap_or(&self.current_language).clone();
        let key = MapKey::new(&langcode, contexts_path);

        if alias.is_empty() || self.no_path.get(&key).is_some_and(|m| m.contains(alias)) {
            return alias.to_string();
        }

        if let Some(path) = self.path_map.get(&key).and_then(|m| m.get(alias)) {
            return path.clone();
        }

        match self.store.lookup_path_source(alias, &langcode, contexts_path) {
            Ok(Some(path)) => {
                self.remember(&key, path.clone(), alias.to_string());
                path
            }
            Ok(None) => {
                self.no_path.entry(key).or_default().insert(alias.to_string());
                alias.to_string()
            }
            Err(e) => {
                tracing::error!(alias, error = %e, "alias source lookup failed");
                alias.to_string()
            }
        }
    }

    /// Alias for `path`, or `path` itself when it has none.
    ///
    /// # Errors
    /// - `MissingLeadingSlash` when `path` does not start with `/`
    pub fn get_alias_by_path(
        &mut self,
        path: &str,
        langcode: Option<&LangCode>,
        contexts_path: Option<&str>,
    ) -> Result<String, ValidationError> {
        ValidationError::require_leading_slash("path", path)?;

        if path == "/" || !self.whitelist.is_known_prefix(top_level_segment(path)) {
            return Ok(path.to_string());
        }

        let langcode = langcode.unwrap_or(&self.current_language).clone();
        let key = MapKey::new(&langcode, contexts_path);

        if !self.initialized.contains(&key) {
            self.initialize(&key, &langcode, contexts_path);
        }

        if self.no_alias.get(&key).is_some_and(|m| m.contains(path)) {
            return Ok(path.to_string());
        }

        if let Some(alias) = self.lookup_map.get(&key).and_then(|m| m.get(path)) {
            return Ok(alias.clone());
        }

        match self.store.lookup_path_alias(path, &langcode, contexts_path) {
            Ok(Some(alias)) => {
                self.remember(&key, path.to_string(), alias.clone());
                Ok(alias)
            }
            Ok(None) => {
                self.no_alias.entry(key).or_default().insert(path.to_string());
                Ok(path.to_string())
            }
            Err(e) => {
                tracing::error!(path, error = %e, "path alias lookup failed");
                Ok(path.to_string())
            }
        }
    }

    /// Persist this request's preload sets if the backend had none.
    ///
    /// Returns whether an entry was written. Call once, at end of request.
    pub fn write_cache(&mut self) -> bool {
        if !self.cache_needs_writing {
            return false;
        }
        let Some(cache_key) = self.cache_key.clone() else {
            return false;
        };

        let mut sets = self.preloaded.clone().unwrap_or_default();
        for (key, lookups) in &self.lookup_map {
            let mut paths: BTreeSet<String> = lookups.keys().cloned().collect();
            if let Some(missing) = self.no_alias.get(key) {
                paths.extend(missing.iter().cloned());
            }
            if !paths.is_empty() {
                sets.insert(key.clone(), paths);
            }
        }
        for (key, missing) in &self.no_alias {
            if !self.lookup_map.contains_key(key) && !missing.is_empty() {
                sets.insert(key.clone(), missing.iter().cloned().collect());
            }
        }
        if sets.is_empty() {
            return false;
        }

        let data = match serde_json::to_value(&sets) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(key = %cache_key, error = %e, "failed to encode preload sets");
                return false;
            }
        };
        match self.backend.set(&cache_key, data, self.ttl) {
            Ok(()) => {
                tracing::debug!(key = %cache_key, partitions = sets.len(), "preload sets written");
                self.cache_needs_writing = false;
                true
            }
            Err(e) => {
                tracing::error!(key = %cache_key, error = %e, "failed to write preload sets");
                false
            }
        }
    }

    /// Forget memoized lookups.
    ///
    /// With a path, only positive entries naming it (as source or alias) are
    /// dropped; without one, every positive entry is. Negative memos and
    /// preload state are always reset, the backend entry for the page is
    /// deleted, and the whitelist is asked to rebuild.
    pub fn cache_clear(&mut self, path: Option<&str>) {
        match path {
            Some(path) => {
                for lookups in self.lookup_map.values_mut() {
                    lookups.retain(|source, alias| source != path && alias != path);
                }
                for sources in self.path_map.values_mut() {
                    sources.retain(|alias, source| source != path && alias != path);
                }
            }
            None => {
                self.lookup_map.clear();
                self.path_map.clear();
            }
        }
        self.no_path.clear();
        self.no_alias.clear();
        self.initialized.clear();
        self.preloaded = Some(PreloadSets::new());

        if let Some(cache_key) = &self.cache_key {
            if let Err(e) = self.backend.delete(cache_key) {
                tracing::error!(key = %cache_key, error = %e, "failed to delete preload sets");
            }
        }
        self.whitelist.rebuild_for(path.unwrap_or("/"));
    }

    /// First lookup in a partition: read the page's preload sets once, then
    /// resolve this partition's set in a single storage call.
    fn initialize(&mut self, key: &MapKey, langcode: &LangCode, contexts_path: Option<&str>) {
        self.initialized.insert(key.clone());
        self.lookup_map.entry(key.clone()).or_default();

        if self.preloaded.is_none() {
            self.preloaded = Some(self.read_preload_sets());
        }

        let Some(paths) = self
            .preloaded
            .as_ref()
            .and_then(|sets| sets.get(key))
            .filter(|paths| !paths.is_empty())
            .cloned()
        else {
            return;
        };

        match self.store.preload_path_alias(&paths, langcode, contexts_path) {
            Ok(found) => {
                let missing: HashSet<String> = paths
                    .into_iter()
                    .filter(|path| !found.contains_key(path))
                    .collect();
                tracing::debug!(
                    partition = %key,
                    found = found.len(),
                    missing = missing.len(),
                    "preloaded path aliases"
                );
                self.no_alias.entry(key.clone()).or_default().extend(missing);
                for (path, alias) in found {
                    self.remember(key, path, alias);
                }
            }
            Err(e) => {
                tracing::error!(partition = %key, error = %e, "path alias preload failed");
            }
        }
    }

    /// Record a resolved pair in both positive memos.
    fn remember(&mut self, key: &MapKey, path: String, alias: String) {
        self.path_map
            .entry(key.clone())
            .or_default()
            .insert(alias.clone(), path.clone());
        self.lookup_map.entry(key.clone()).or_default().insert(path, alias);
    }

    fn read_preload_sets(&mut self) -> PreloadSets {
        let Some(cache_key) = self.cache_key.as_deref() else {
            return PreloadSets::new();
        };
        match self.backend.get(cache_key) {
            Ok(Some(item)) => match serde_json::from_value(item.data) {
                Ok(sets) => return sets,
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "discarding malformed preload sets");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::error!(key = %cache_key, error = %e, "failed to read preload sets");
            }
        }
        self.cache_needs_writing = true;
        PreloadSets::new()
    }
}

impl std::fmt::Debug for AliasCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasCache")
            .field("current_language", &self.current_language)
            .field("cache_key", &self.cache_key)
            .field("cache_needs_writing", &self.cache_needs_writing)
            .field("partitions", &self.lookup_map.len())
            .finish_non_exhaustive()
    }
}
