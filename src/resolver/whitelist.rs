//! Top-level segment allow-lists.
//!
//! `get_alias_by_path` never queries storage for a path whose first segment
//! no alias source starts with.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::storage::AliasStore;

/// Predicate over first path segments.
pub trait AliasWhitelist: Send + Sync {
    /// Whether paths starting with `segment` may have aliases.
    fn is_known_prefix(&self, segment: &str) -> bool;

    /// Refresh after aliases under `path` changed. Default: no-op.
    fn rebuild_for(&self, _path: &str) {}
}

/// First segment of `path`, without slashes.
pub(crate) fn top_level_segment(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or_default()
}

/// A fixed allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticWhitelist {
    segments: BTreeSet<String>,
}

impl StaticWhitelist {
    /// Allow exactly `segments`.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }
}

impl AliasWhitelist for StaticWhitelist {
    fn is_known_prefix(&self, segment: &str) -> bool {
        self.segments.contains(segment)
    }
}

/// Allow-list derived from the alias store.
///
/// Segments are collected on first use and dropped by
/// [`AliasWhitelist::rebuild_for`] when a path under an unknown segment
/// changes. A storage failure allows every segment rather than hiding aliases.
pub struct StoreWhitelist {
    store: Arc<dyn AliasStore>,
    segments: RwLock<Option<BTreeSet<String>>>,
}

impl StoreWhitelist {
    /// Create a whitelist that loads lazily from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AliasStore>) -> Self {
        Self {
            store,
            segments: RwLock::new(None),
        }
    }

    fn load(&self) -> Option<BTreeSet<String>> {
        match self.store.top_level_segments() {
            Ok(segments) => {
                tracing::debug!(segments = segments.len(), "alias whitelist built");
                Some(segments)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to build alias whitelist");
                None
            }
        }
    }

    fn invalidate(&self) {
        if let Ok(mut segments) = self.segments.write() {
            *segments = None;
        } else {
            tracing::error!("poisoned lock: whitelist.invalidate");
        }
    }
}

impl AliasWhitelist for StoreWhitelist {
    fn is_known_prefix(&self, segment: &str) -> bool {
        if let Ok(segments) = self.segments.read() {
            if let Some(segments) = segments.as_ref() {
                return segments.contains(segment);
            }
        }

        let Some(loaded) = self.load() else {
            return true;
        };
        let known = loaded.contains(segment);
        if let Ok(mut segments) = self.segments.write() {
            *segments = Some(loaded);
        }
        known
    }

    fn rebuild_for(&self, path: &str) {
        let segment = top_level_segment(path);
        let known = self
            .segments
            .read()
            .is_ok_and(|segments| segments.as_ref().is_none_or(|s| s.contains(segment)));
        if !known {
            self.invalidate();
        }
    }
}

impl std::fmt::Debug for StoreWhitelist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWhitelist")
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}
