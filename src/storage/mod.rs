//! Alias storage.
//!
//! The traits in [`traits`] are the seams the resolver depends on. The
//! in-memory backend serves tests and embedded use; the durable backend sits
//! behind the `persistent` feature.

mod memory;
mod tables;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{InMemoryAliasStore, InMemoryCacheBackend, TagLedger};
pub use traits::{AliasStore, CacheBackend, CacheItem, CacheTagInvalidator, StorageError};
