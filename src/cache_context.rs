//! Render-cache variation on the negotiated contexts.

use std::collections::BTreeSet;

use crate::context::ContextNegotiator;

/// Cache-variation metadata collected while building a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheableMetadata {
    cache_contexts: BTreeSet<String>,
    cache_tags: BTreeSet<String>,
}

impl CacheableMetadata {
    /// Empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the response as varying on each of `contexts`.
    pub fn add_cache_contexts<I, S>(&mut self, contexts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_contexts.extend(contexts.into_iter().map(Into::into));
    }

    /// Attach invalidation tags.
    pub fn add_cache_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_tags.extend(tags.into_iter().map(Into::into));
    }

    /// Variation dimensions.
    #[must_use]
    pub fn cache_contexts(&self) -> &BTreeSet<String> {
        &self.cache_contexts
    }

    /// Invalidation tags.
    #[must_use]
    pub fn cache_tags(&self) -> &BTreeSet<String> {
        &self.cache_tags
    }

    /// Whether the response varies on `context`.
    #[must_use]
    pub fn varies_on(&self, context: &str) -> bool {
        self.cache_contexts.contains(context)
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.cache_contexts.extend(other.cache_contexts.iter().cloned());
        self.cache_tags.extend(other.cache_tags.iter().cloned());
    }
}

/// The `contexts` cache context: one value per distinct contexts path.
#[derive(Debug, Clone, Copy)]
pub struct ContextsCacheContext<'a> {
    negotiator: &'a ContextNegotiator,
}

impl<'a> ContextsCacheContext<'a> {
    /// Name of the variation dimension.
    pub const CONTEXTS: &'static str = "contexts";

    /// Bind to a request's negotiator.
    #[must_use]
    pub fn new(negotiator: &'a ContextNegotiator) -> Self {
        Self { negotiator }
    }

    /// Human readable label.
    #[must_use]
    pub fn label() -> &'static str {
        "Contexts"
    }

    /// Stable digest of the current contexts path (or of `none`).
    #[must_use]
    pub fn context(&self) -> String {
        let contexts_path = self
            .negotiator
            .get_contexts_path(None)
            .unwrap_or_else(|| "none".to_string());
        blake3::hash(contexts_path.as_bytes()).to_hex().to_string()
    }

    /// Tags of every negotiated context.
    #[must_use]
    pub fn cacheable_metadata(&self) -> CacheableMetadata {
        let mut metadata = CacheableMetadata::new();
        for context in self.negotiator.contexts().contexts() {
            metadata.add_cache_tags(context.cache_tags());
        }
        metadata
    }
}
