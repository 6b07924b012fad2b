//! Alias rows and context associations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::language::LangCode;

/// Surrogate key of an alias record.
///
/// Assigned by the store on insert, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u64);

impl Pid {
    /// Wraps a raw key.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw key.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Pid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// One alias row: `source` is the canonical path, `alias` the public one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Surrogate key.
    pub pid: Pid,
    /// Canonical path, starts with `/`.
    pub source: String,
    /// Public path, starts with `/`.
    pub alias: String,
    /// Language of the alias.
    pub langcode: LangCode,
}

/// Scopes an alias record to one contexts path.
///
/// Identity is the full `(pid, contexts_path, weight)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextPathAssociation {
    /// Owning record.
    pub pid: Pid,
    /// `/`-joined context ids, e.g. `store-a/warehouse-3`.
    pub contexts_path: String,
    /// Ordering weight.
    pub weight: i32,
}

/// A record together with every association it owns, ordered by weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// The alias row.
    pub record: AliasRecord,
    /// Context scopes of the row; empty when the alias is unscoped.
    pub contexts: Vec<ContextPathAssociation>,
}

impl AliasEntry {
    /// The first contexts path by weight, if the record is scoped.
    #[must_use]
    pub fn contexts_path(&self) -> Option<&str> {
        self.contexts.first().map(|a| a.contexts_path.as_str())
    }

    /// Whether the record is scoped to exactly this contexts path.
    #[must_use]
    pub fn has_contexts_path(&self, contexts_path: &str) -> bool {
        self.contexts.iter().any(|a| a.contexts_path == contexts_path)
    }
}
