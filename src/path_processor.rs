//! Inbound and outbound path rewriting at the routing boundary.

use crate::cache_context::{CacheableMetadata, ContextsCacheContext};
use crate::context::{Context, ContextNegotiator};
use crate::error::ValidationError;
use crate::language::LangCode;
use crate::resolver::AliasCache;

/// Options for building an outbound URL path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundOptions {
    /// Contexts to prefix instead of the negotiated stack.
    pub contexts: Option<Vec<Context>>,
    /// The path is already an alias; skip the alias lookup.
    pub alias: bool,
    /// Language of the link; the request language when unset.
    pub language: Option<LangCode>,
}

impl OutboundOptions {
    /// Default options: negotiated contexts, alias lookup, request language.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix these contexts instead of the negotiated stack.
    #[must_use]
    pub fn with_contexts(mut self, contexts: Vec<Context>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    /// Mark the path as already aliased.
    #[must_use]
    pub fn already_aliased(mut self) -> Self {
        self.alias = true;
        self
    }

    /// Resolve the alias in `language`.
    #[must_use]
    pub fn with_language(mut self, language: LangCode) -> Self {
        self.language = Some(language);
        self
    }
}

/// Rewrites paths using one request's negotiator and alias cache.
#[derive(Debug)]
pub struct PathProcessor<'a> {
    negotiator: &'a mut ContextNegotiator,
    aliases: &'a mut AliasCache,
}

impl<'a> PathProcessor<'a> {
    /// Borrow a request's negotiator and alias cache.
    #[must_use]
    pub fn new(negotiator: &'a mut ContextNegotiator, aliases: &'a mut AliasCache) -> Self {
        Self {
            negotiator,
            aliases,
        }
    }

    /// Incoming URL path to system path: strip the context prefix, then
    /// resolve what remains as an alias.
    pub fn process_inbound(&mut self, path: &str) -> String {
        let path = self.negotiator.process_path_inbound(path);
        let contexts_path = self.negotiator.get_contexts_path(None);
        self.aliases
            .get_path_by_alias(&path, None, contexts_path.as_deref())
    }

    /// System path to outgoing URL path: resolve the alias within the target
    /// contexts, then prefix their contexts path.
    ///
    /// # Errors
    /// - `MissingLeadingSlash` when `path` does not start with `/`
    pub fn process_outbound(
        &mut self,
        path: &str,
        options: &OutboundOptions,
        metadata: Option<&mut CacheableMetadata>,
    ) -> Result<String, ValidationError> {
        if let Some(metadata) = metadata {
            metadata.add_cache_contexts([ContextsCacheContext::CONTEXTS]);
        }

        let contexts_path = match &options.contexts {
            Some(contexts) if !contexts.is_empty() => {
                self.negotiator.get_contexts_path(Some(contexts.as_slice()))
            }
            _ => self.negotiator.get_contexts_path(None),
        };

        let mut path = if options.alias {
            path.to_string()
        } else {
            self.aliases.get_alias_by_path(
                path,
                options.language.as_ref(),
                contexts_path.as_deref(),
            )?
        };

        if let Some(prefix) = contexts_path.filter(|p| !p.is_empty()) {
            path = format!("/{prefix}{path}");
        }
        Ok(path)
    }
}
