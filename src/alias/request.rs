//! Write requests, query conditions and write outcomes.

use serde::{Deserialize, Serialize};

use super::{AliasRecord, ContextPathAssociation, Pid};
use crate::error::ValidationError;
use crate::language::LangCode;

/// A validated alias write.
///
/// Without a pid the write inserts a new record; with one it updates that
/// record. A contexts path attaches the record to a scope; together with
/// [`SaveRequest::replacing`] it renames an existing scope instead.
///
/// # Example
/// ```
/// use ctxalias::{Pid, SaveRequest};
///
/// let request = SaveRequest::new("/node/1", "/about")?
///     .pid(Pid::new(1))
///     .contexts_path("ctx3/ctx4")
///     .replacing("ctx1/ctx2");
/// assert_eq!(request.contexts_path_existing(), Some("ctx1/ctx2"));
/// # Ok::<(), ctxalias::ValidationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    source: String,
    alias: String,
    langcode: LangCode,
    pid: Option<Pid>,
    contexts_path_new: Option<String>,
    contexts_path_existing: Option<String>,
    weight: i32,
}

impl SaveRequest {
    /// Starts a language-neutral write.
    ///
    /// # Errors
    /// - `MissingLeadingSlash`: If `source` or `alias` does not start with `/`
    pub fn new(source: impl Into<String>, alias: impl Into<String>) -> Result<Self, ValidationError> {
        let source = source.into();
        let alias = alias.into();
        ValidationError::require_leading_slash("source", &source)?;
        ValidationError::require_leading_slash("alias", &alias)?;
        Ok(Self {
            source,
            alias,
            langcode: LangCode::not_specified(),
            pid: None,
            contexts_path_new: None,
            contexts_path_existing: None,
            weight: 0,
        })
    }

    /// Set the alias language (default: `und`).
    #[must_use]
    pub fn langcode(mut self, langcode: LangCode) -> Self {
        self.langcode = langcode;
        self
    }

    /// Update the record with this pid instead of inserting.
    #[must_use]
    pub fn pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Scope the record to this contexts path. Blank input is ignored.
    #[must_use]
    pub fn contexts_path(mut self, contexts_path: impl AsRef<str>) -> Self {
        self.contexts_path_new = normalize_contexts_path(contexts_path.as_ref()).map(str::to_string);
        self
    }

    /// On update, rewrite the association currently at this contexts path.
    #[must_use]
    pub fn replacing(mut self, contexts_path: impl AsRef<str>) -> Self {
        self.contexts_path_existing =
            normalize_contexts_path(contexts_path.as_ref()).map(str::to_string);
        self
    }

    /// Ordering weight of the association (default: 0).
    #[must_use]
    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Canonical path.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Public path.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Alias language.
    #[must_use]
    pub fn language(&self) -> &LangCode {
        &self.langcode
    }

    /// Target record, if this is an update.
    #[must_use]
    pub fn target_pid(&self) -> Option<Pid> {
        self.pid
    }

    /// New contexts path.
    #[must_use]
    pub fn contexts_path_new(&self) -> Option<&str> {
        self.contexts_path_new.as_deref()
    }

    /// Contexts path being replaced.
    #[must_use]
    pub fn contexts_path_existing(&self) -> Option<&str> {
        self.contexts_path_existing.as_deref()
    }

    /// Association weight.
    #[must_use]
    pub fn association_weight(&self) -> i32 {
        self.weight
    }
}

/// Canonical form of a contexts path: surrounding whitespace and slashes
/// removed. Blank input has no contexts path.
pub(crate) fn normalize_contexts_path(contexts_path: &str) -> Option<&str> {
    Some(contexts_path.trim().trim_matches('/')).filter(|path| !path.is_empty())
}

/// Filters for [`crate::AliasStore::load`] and friends.
///
/// `source` and `alias` match case-insensitively but in full; `contexts_path`
/// requires an association with exactly that path. Unset fields match all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasConditions {
    /// Exact pid.
    pub pid: Option<Pid>,
    /// Case-insensitive source.
    pub source: Option<String>,
    /// Case-insensitive alias.
    pub alias: Option<String>,
    /// Exact language.
    pub langcode: Option<LangCode>,
    /// Exact contexts path.
    pub contexts_path: Option<String>,
}

impl AliasConditions {
    /// Conditions matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a pid.
    #[must_use]
    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Match a source path.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Match an alias path.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Match a language.
    #[must_use]
    pub fn with_langcode(mut self, langcode: LangCode) -> Self {
        self.langcode = Some(langcode);
        self
    }

    /// Match a contexts path. Blank input matches every record.
    #[must_use]
    pub fn with_contexts_path(mut self, contexts_path: impl AsRef<str>) -> Self {
        self.contexts_path = normalize_contexts_path(contexts_path.as_ref()).map(str::to_string);
        self
    }

    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Whether a save inserted or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOperation {
    /// A new record was created.
    Insert,
    /// An existing record was rewritten.
    Update,
}

/// What a successful save wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Insert or update.
    pub operation: SaveOperation,
    /// The record as stored now.
    pub record: AliasRecord,
    /// The association written by this save, if any.
    pub association: Option<ContextPathAssociation>,
    /// The record before an update.
    pub original: Option<AliasRecord>,
}

impl SaveOutcome {
    /// True when an update changed source, alias or language.
    #[must_use]
    pub fn changed_fields(&self) -> bool {
        self.original.as_ref().is_some_and(|original| {
            original.source != self.record.source
                || original.alias != self.record.alias
                || original.langcode != self.record.langcode
        })
    }
}
