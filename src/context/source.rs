//! Context lookup.

use std::collections::HashMap;
use std::sync::RwLock;

use super::Context;
use crate::storage::StorageError;

/// Looks contexts up by id. Persistence belongs to the implementor.
pub trait ContextSource: Send + Sync {
    /// Load a context by id.
    ///
    /// # Errors
    /// - `BackendError` / `ConnectionError`: If the registry cannot be read
    fn load_context(&self, id: &str) -> Result<Option<Context>, StorageError>;
}

/// Thread-safe in-memory context registry.
#[derive(Debug, Default)]
pub struct InMemoryContextSource {
    contexts: RwLock<HashMap<String, Context>>,
}

impl InMemoryContextSource {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `contexts`.
    #[must_use]
    pub fn with_contexts(contexts: impl IntoIterator<Item = Context>) -> Self {
        let map = contexts.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            contexts: RwLock::new(map),
        }
    }

    /// Register or replace a context. Returns the previous one under that id.
    ///
    /// # Errors
    /// - `BackendError`: If the registry lock is poisoned
    pub fn insert(&self, context: Context) -> Result<Option<Context>, StorageError> {
        let mut contexts = self.contexts.write().map_err(|_| lock_err("context.insert"))?;
        Ok(contexts.insert(context.id.clone(), context))
    }

    /// Remove a context by id.
    ///
    /// # Errors
    /// - `BackendError`: If the registry lock is poisoned
    pub fn remove(&self, id: &str) -> Result<Option<Context>, StorageError> {
        let mut contexts = self.contexts.write().map_err(|_| lock_err("context.remove"))?;
        Ok(contexts.remove(id))
    }
}

impl ContextSource for InMemoryContextSource {
    fn load_context(&self, id: &str) -> Result<Option<Context>, StorageError> {
        let contexts = self.contexts.read().map_err(|_| lock_err("context.load"))?;
        Ok(contexts.get(id).cloned())
    }
}

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}
