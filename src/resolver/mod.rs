//! Alias resolution: the per-request cache in front of an [`crate::AliasStore`].

mod alias_cache;
mod map_key;
mod whitelist;

pub use alias_cache::AliasCache;
pub use map_key::MapKey;
pub use whitelist::{AliasWhitelist, StaticWhitelist, StoreWhitelist};
