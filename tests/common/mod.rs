//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ctxalias::{
    AliasCache, AliasConditions, AliasEntry, AliasStore, CacheBackend, Context, ContextsConfig,
    InMemoryAliasStore, InMemoryCacheBackend, LangCode, Pid, SaveOutcome, SaveRequest,
    StaticWhitelist, StorageError,
};

/// Wraps a store and counts lookup calls. Lookups can be made to fail.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryAliasStore,
    pub path_alias: AtomicUsize,
    pub path_source: AtomicUsize,
    pub preload: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookups(&self) -> usize {
        self.path_alias.load(Ordering::SeqCst)
            + self.path_source.load(Ordering::SeqCst)
            + self.preload.load(Ordering::SeqCst)
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::ConnectionError("backend offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AliasStore for CountingStore {
    fn save(&self, request: SaveRequest) -> Result<SaveOutcome, StorageError> {
        self.inner.save(request)
    }

    fn load(&self, conditions: &AliasConditions) -> Result<Option<AliasEntry>, StorageError> {
        self.inner.load(conditions)
    }

    fn load_all(
        &self,
        conditions: &AliasConditions,
    ) -> Result<BTreeMap<Pid, AliasEntry>, StorageError> {
        self.inner.load_all(conditions)
    }

    fn delete(&self, conditions: &AliasConditions) -> Result<usize, StorageError> {
        self.inner.delete(conditions)
    }

    fn lookup_path_alias(
        &self,
        path: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        self.path_alias.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.lookup_path_alias(path, langcode, contexts_path)
    }

    fn lookup_path_source(
        &self,
        alias: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        self.path_source.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.lookup_path_source(alias, langcode, contexts_path)
    }

    fn preload_path_alias(
        &self,
        paths: &BTreeSet<String>,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        self.preload.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.preload_path_alias(paths, langcode, contexts_path)
    }

    fn alias_exists(
        &self,
        alias: &str,
        langcode: &LangCode,
        source: Option<&str>,
        contexts_path: Option<&str>,
    ) -> Result<bool, StorageError> {
        self.inner.alias_exists(alias, langcode, source, contexts_path)
    }

    fn language_alias_exists(&self) -> Result<bool, StorageError> {
        self.inner.language_alias_exists()
    }

    fn list_aliases(
        &self,
        filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AliasEntry>, StorageError> {
        self.inner.list_aliases(filter, offset, limit)
    }

    fn top_level_segments(&self) -> Result<BTreeSet<String>, StorageError> {
        self.inner.top_level_segments()
    }
}

pub fn lang(code: &str) -> LangCode {
    LangCode::new(code).unwrap()
}

pub fn ctx(id: &str, position: u32) -> Context {
    Context::new(id, id, position).unwrap()
}

/// A request-scoped cache over `store` and `backend`, whitelisting `node`.
pub fn alias_cache(
    store: &Arc<CountingStore>,
    backend: &Arc<InMemoryCacheBackend>,
    language: LangCode,
) -> AliasCache {
    let store: Arc<dyn AliasStore> = store.clone();
    let backend: Arc<dyn CacheBackend> = backend.clone();
    AliasCache::new(
        store,
        backend,
        Arc::new(StaticWhitelist::new(["node", "user"])),
        &ContextsConfig::default(),
        language,
    )
}
