//! Cache partition keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alias::normalize_contexts_path;
use crate::language::LangCode;

/// Identifies one cache partition: a language and a contexts path.
///
/// The key is a blake3 digest, so it is safe to embed in persisted preload
/// entries whatever characters the contexts path contains.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapKey(String);

impl MapKey {
    /// Key for `langcode` under `contexts_path`. Contexts paths are compared
    /// in normalized form, so an empty path and no path share a partition.
    #[must_use]
    pub fn new(langcode: &LangCode, contexts_path: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(langcode.as_str().as_bytes());
        hasher.update(&[0]);
        let contexts_path = contexts_path.and_then(normalize_contexts_path);
        hasher.update(contexts_path.unwrap_or_default().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
