//! # ctxalias - Context-scoped URL alias resolution
//!
//! Human readable URL aliases resolve to canonical paths and back. Resolution
//! is scoped by language and by an ordered stack of **contexts**: positioned
//! path prefixes such as `/store-a/warehouse-3/...` negotiated per request.
//!
//! ## Core Concepts
//!
//! - **Context**: a named path segment at a fixed position in the stack
//! - **Contexts path**: the `/`-joined context ids, used as URL prefix and cache dimension
//! - **`AliasStore`**: alias records and their many-to-many context associations
//! - **`AliasCache`**: per-request memo layers and preload sets in front of the store
//! - **`RequestScope`**: everything one request owns, built by an [`AliasEngine`]
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use ctxalias::{
//!     AliasEngine, Context, ContextsConfig, InMemoryContextSource, LangCode, OutboundOptions,
//!     SaveRequest,
//! };
//!
//! let contexts = InMemoryContextSource::with_contexts([
//!     Context::new("store-a", "Store A", 0)?,
//! ]);
//! let engine = AliasEngine::in_memory(Arc::new(contexts), ContextsConfig::default())?;
//! engine.save(SaveRequest::new("/node/1", "/about")?.contexts_path("store-a"))?;
//!
//! let mut scope = engine.begin_request("/store-a/about", LangCode::not_specified());
//! assert_eq!(scope.process_inbound("/store-a/about"), "/node/1");
//! assert_eq!(
//!     scope.process_outbound("/node/1", &OutboundOptions::new(), None)?,
//!     "/store-a/about"
//! );
//! scope.finish();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod language;

// Subsystems
pub mod alias;
pub mod context;
pub mod resolver;
pub mod storage;

// Request boundary
pub mod cache_context;
pub mod engine;
pub mod path_processor;

// Re-export primary types at crate root for convenience
pub use alias::{
    AliasConditions, AliasEntry, AliasRecord, ContextPathAssociation, Pid, SaveOperation,
    SaveOutcome, SaveRequest,
};
pub use config::{ContextsConfig, DEFAULT_INVALIDATION_TAG};
pub use context::{
    contexts_paths, Context, ContextNegotiator, ContextSource, ContextStack, InMemoryContextSource,
};
pub use error::{CtxError, CtxResult, ValidationError};
pub use language::LangCode;

pub use resolver::{AliasCache, AliasWhitelist, MapKey, StaticWhitelist, StoreWhitelist};
pub use storage::{
    AliasStore, CacheBackend, CacheItem, CacheTagInvalidator, InMemoryAliasStore,
    InMemoryCacheBackend, StorageError, TagLedger,
};

pub use cache_context::{CacheableMetadata, ContextsCacheContext};
pub use engine::{AliasEngine, RequestScope};
pub use path_processor::{OutboundOptions, PathProcessor};

#[cfg(feature = "persistent")]
pub use storage::persistent::{open_store, PersistentAliasStore, PersistentConfig};
