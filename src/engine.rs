//! Shared collaborators and the per-request scope built from them.
//!
//! An [`AliasEngine`] is built once and shared. Every request gets its own
//! [`RequestScope`], which owns the negotiated context stack and the alias
//! memos; nothing request-specific outlives the scope.

use std::sync::Arc;

use crate::alias::{AliasConditions, AliasEntry, SaveOutcome, SaveRequest};
use crate::cache_context::{CacheableMetadata, ContextsCacheContext};
use crate::config::ContextsConfig;
use crate::context::{ContextNegotiator, ContextSource};
use crate::error::{CtxResult, ValidationError};
use crate::language::LangCode;
use crate::path_processor::{OutboundOptions, PathProcessor};
use crate::resolver::{AliasCache, AliasWhitelist, StoreWhitelist};
use crate::storage::{
    AliasStore, CacheBackend, CacheTagInvalidator, InMemoryAliasStore, InMemoryCacheBackend,
};

/// Process-wide collaborators.
#[derive(Clone)]
pub struct AliasEngine {
    store: Arc<dyn AliasStore>,
    backend: Arc<dyn CacheBackend>,
    whitelist: Arc<dyn AliasWhitelist>,
    contexts: Arc<dyn ContextSource>,
    config: Arc<ContextsConfig>,
}

impl AliasEngine {
    /// Create an engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn AliasStore>,
        backend: Arc<dyn CacheBackend>,
        whitelist: Arc<dyn AliasWhitelist>,
        contexts: Arc<dyn ContextSource>,
        config: ContextsConfig,
    ) -> Self {
        Self {
            store,
            backend,
            whitelist,
            contexts,
            config: Arc::new(config),
        }
    }

    /// An engine over in-memory stores with a store-derived whitelist.
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` fails validation
    pub fn in_memory(
        contexts: Arc<dyn ContextSource>,
        config: ContextsConfig,
    ) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        Ok(Self::in_memory_over(InMemoryAliasStore::new(), contexts, config))
    }

    /// Like [`Self::in_memory`], broadcasting the configured invalidation tag
    /// on `sink` after every alias mutation.
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` fails validation
    pub fn in_memory_with_invalidator(
        contexts: Arc<dyn ContextSource>,
        config: ContextsConfig,
        sink: Arc<dyn CacheTagInvalidator>,
    ) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        let store = InMemoryAliasStore::with_invalidator(sink, config.invalidation_tag.clone());
        Ok(Self::in_memory_over(store, contexts, config))
    }

    fn in_memory_over(
        store: InMemoryAliasStore,
        contexts: Arc<dyn ContextSource>,
        config: ContextsConfig,
    ) -> Self {
        let store: Arc<dyn AliasStore> = Arc::new(store);
        let whitelist = Arc::new(StoreWhitelist::new(Arc::clone(&store)));
        Self::new(
            store,
            Arc::new(InMemoryCacheBackend::new()),
            whitelist,
            contexts,
            config,
        )
    }

    /// The alias store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AliasStore> {
        &self.store
    }

    /// The shared cache backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &ContextsConfig {
        &self.config
    }

    /// Save an alias and refresh the whitelist for its source.
    ///
    /// # Errors
    /// - `Storage` when the store rejects or fails the write
    pub fn save(&self, request: SaveRequest) -> CtxResult<SaveOutcome> {
        let outcome = self.store.save(request)?;
        self.whitelist.rebuild_for(&outcome.record.source);
        if outcome.changed_fields() {
            if let Some(original) = &outcome.original {
                self.whitelist.rebuild_for(&original.source);
            }
        }
        Ok(outcome)
    }

    /// Delete matching aliases and drop the whitelist.
    ///
    /// # Errors
    /// - `Storage` when the store fails the delete
    pub fn delete(&self, conditions: &AliasConditions) -> CtxResult<usize> {
        let deleted = self.store.delete(conditions)?;
        if deleted > 0 {
            self.whitelist.rebuild_for("/");
        }
        Ok(deleted)
    }

    /// One page of the alias listing, `admin_page_size` records per page.
    ///
    /// # Errors
    /// - `Storage` when the store fails the listing or `filter` is unusable
    pub fn list_aliases(&self, filter: Option<&str>, page: usize) -> CtxResult<Vec<AliasEntry>> {
        let limit = self.config.admin_page_size;
        let offset = page.saturating_mul(limit);
        Ok(self.store.list_aliases(filter, offset, limit)?)
    }

    /// Start a request: negotiate contexts from `uri` in `langcode`.
    #[must_use]
    pub fn begin_request(&self, uri: &str, langcode: LangCode) -> RequestScope {
        let mut negotiator = ContextNegotiator::new(Arc::clone(&self.contexts));
        negotiator.negotiate_contexts(
            uri,
            langcode.as_str(),
            self.config.language_prefix(langcode.as_str()),
        );
        let aliases = AliasCache::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            Arc::clone(&self.whitelist),
            &self.config,
            langcode,
        );
        RequestScope {
            negotiator,
            aliases,
        }
    }
}

impl std::fmt::Debug for AliasEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// State for one request. Build one per request via
/// [`AliasEngine::begin_request`] and end it with [`RequestScope::finish`].
#[derive(Debug)]
pub struct RequestScope {
    negotiator: ContextNegotiator,
    aliases: AliasCache,
}

impl RequestScope {
    /// The request language.
    #[must_use]
    pub fn language(&self) -> &LangCode {
        self.aliases.current_language()
    }

    /// The negotiated contexts.
    #[must_use]
    pub fn negotiator(&self) -> &ContextNegotiator {
        &self.negotiator
    }

    /// Mutable access for layering extra contexts onto outbound links.
    pub fn negotiator_mut(&mut self) -> &mut ContextNegotiator {
        &mut self.negotiator
    }

    /// The request's alias cache.
    pub fn alias_cache(&mut self) -> &mut AliasCache {
        &mut self.aliases
    }

    /// The `contexts` cache context for this request.
    #[must_use]
    pub fn cache_context(&self) -> ContextsCacheContext<'_> {
        ContextsCacheContext::new(&self.negotiator)
    }

    /// A path processor borrowing this request's state.
    pub fn path_processor(&mut self) -> PathProcessor<'_> {
        PathProcessor::new(&mut self.negotiator, &mut self.aliases)
    }

    /// Resolve the incoming path and key the preload set on the result.
    pub fn process_inbound(&mut self, path: &str) -> String {
        let system_path = self.path_processor().process_inbound(path);
        self.aliases.set_cache_key(&system_path);
        system_path
    }

    /// Build an outgoing link path.
    ///
    /// # Errors
    /// - `MissingLeadingSlash` when `path` does not start with `/`
    pub fn process_outbound(
        &mut self,
        path: &str,
        options: &OutboundOptions,
        metadata: Option<&mut CacheableMetadata>,
    ) -> Result<String, ValidationError> {
        self.path_processor().process_outbound(path, options, metadata)
    }

    /// End the request, persisting the preload set when needed. Returns
    /// whether an entry was written.
    pub fn finish(mut self) -> bool {
        let written = self.aliases.write_cache();
        tracing::debug!(
            cache_key = self.aliases.cache_key().unwrap_or_default(),
            written,
            "request finished"
        );
        written
    }
}
