//! Alias and association tables shared by the in-memory and durable stores.
//!
//! Mutations are split into a planning step that reads the tables and yields
//! [`TableChange`]s, and an apply step. The durable store logs the planned
//! changes before applying them, so replay goes through the same code.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::alias::{
    normalize_contexts_path, AliasConditions, AliasEntry, AliasRecord, ContextPathAssociation, Pid, SaveOperation,
    SaveOutcome, SaveRequest,
};
use crate::language::LangCode;
use crate::storage::traits::{CacheTagInvalidator, StorageError};

fn fold(s: &str) -> String {
    s.to_lowercase()
}

fn eq_fold(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}

fn scope(contexts_path: Option<&str>) -> Option<&str> {
    contexts_path.and_then(normalize_contexts_path)
}

/// A single row-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum TableChange {
    /// Insert or overwrite an alias row.
    PutRecord(AliasRecord),
    /// Insert an association row.
    PutAssociation(ContextPathAssociation),
    /// Remove an association row.
    RemoveAssociation(ContextPathAssociation),
    /// Remove an alias row and every association it owns.
    RemoveRecord(Pid),
}

/// The alias table, the association table and the pid counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AliasTables {
    last_pid: u64,
    aliases: BTreeMap<Pid, AliasRecord>,
    associations: BTreeSet<ContextPathAssociation>,
}

impl AliasTables {
    /// Plan a save without touching the tables.
    pub(crate) fn plan_save(
        &self,
        request: &SaveRequest,
    ) -> Result<(SaveOutcome, Vec<TableChange>), StorageError> {
        let mut changes = Vec::new();

        let Some(pid) = request.target_pid() else {
            let record = AliasRecord {
                pid: Pid::new(self.last_pid + 1),
                source: request.source().to_string(),
                alias: request.alias().to_string(),
                langcode: request.language().clone(),
            };
            changes.push(TableChange::PutRecord(record.clone()));
            let association = request.contexts_path_new().map(|path| ContextPathAssociation {
                pid: record.pid,
                contexts_path: path.to_string(),
                weight: request.association_weight(),
            });
            if let Some(association) = &association {
                changes.push(TableChange::PutAssociation(association.clone()));
            }
            let outcome = SaveOutcome {
                operation: SaveOperation::Insert,
                record,
                association,
                original: None,
            };
            return Ok((outcome, changes));
        };

        let original = self
            .aliases
            .get(&pid)
            .cloned()
            .ok_or(StorageError::PidNotFound(pid))?;
        let record = AliasRecord {
            pid,
            source: request.source().to_string(),
            alias: request.alias().to_string(),
            langcode: request.language().clone(),
        };
        changes.push(TableChange::PutRecord(record.clone()));

        let mut association = None;
        if let Some(path) = request.contexts_path_new() {
            let updated = ContextPathAssociation {
                pid,
                contexts_path: path.to_string(),
                weight: request.association_weight(),
            };
            match request.contexts_path_existing() {
                Some(existing) => {
                    let matched: Vec<_> = self
                        .associations_of(pid)
                        .filter(|a| a.contexts_path == existing)
                        .cloned()
                        .collect();
                    // Renaming a scope the record does not have writes nothing.
                    if !matched.is_empty() {
                        changes.extend(matched.into_iter().map(TableChange::RemoveAssociation));
                        changes.push(TableChange::PutAssociation(updated.clone()));
                        association = Some(updated);
                    }
                }
                None => {
                    changes.push(TableChange::PutAssociation(updated.clone()));
                    association = Some(updated);
                }
            }
        }

        let outcome = SaveOutcome {
            operation: SaveOperation::Update,
            record,
            association,
            original: Some(original),
        };
        Ok((outcome, changes))
    }

    /// Plan removal of every matching record.
    pub(crate) fn plan_delete(&self, conditions: &AliasConditions) -> Vec<TableChange> {
        self.matching(conditions)
            .map(|record| TableChange::RemoveRecord(record.pid))
            .collect()
    }

    pub(crate) fn apply(&mut self, change: TableChange) {
        match change {
            TableChange::PutRecord(record) => {
                self.last_pid = self.last_pid.max(record.pid.get());
                self.aliases.insert(record.pid, record);
            }
            TableChange::PutAssociation(association) => {
                self.associations.insert(association);
            }
            TableChange::RemoveAssociation(association) => {
                self.associations.remove(&association);
            }
            TableChange::RemoveRecord(pid) => {
                self.aliases.remove(&pid);
                self.associations.retain(|a| a.pid != pid);
            }
        }
    }

    pub(crate) fn apply_all(&mut self, changes: impl IntoIterator<Item = TableChange>) {
        for change in changes {
            self.apply(change);
        }
    }

    pub(crate) fn record_count(&self) -> usize {
        self.aliases.len()
    }

    pub(crate) fn load_all(&self, conditions: &AliasConditions) -> BTreeMap<Pid, AliasEntry> {
        self.matching(conditions)
            .map(|record| (record.pid, self.entry(record)))
            .collect()
    }

    pub(crate) fn load(&self, conditions: &AliasConditions) -> Option<AliasEntry> {
        self.matching(conditions)
            .max_by_key(|record| record.pid)
            .map(|record| self.entry(record))
    }

    pub(crate) fn lookup_path_alias(
        &self,
        path: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Option<String> {
        self.candidates(langcode, contexts_path)
            .filter(|record| eq_fold(&record.source, path))
            .min_by_key(|record| (langcode.preference(&record.langcode), Reverse(record.pid)))
            .map(|record| record.alias.clone())
    }

    pub(crate) fn lookup_path_source(
        &self,
        alias: &str,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> Option<String> {
        self.candidates(langcode, contexts_path)
            .filter(|record| eq_fold(&record.alias, alias))
            .min_by_key(|record| (langcode.preference(&record.langcode), Reverse(record.pid)))
            .map(|record| record.source.clone())
    }

    pub(crate) fn preload_path_alias(
        &self,
        paths: &BTreeSet<String>,
        langcode: &LangCode,
        contexts_path: Option<&str>,
    ) -> BTreeMap<String, String> {
        if paths.is_empty() {
            return BTreeMap::new();
        }

        let mut best: HashMap<String, &AliasRecord> = HashMap::new();
        for record in self.candidates(langcode, contexts_path) {
            let key = fold(&record.source);
            let replace = best.get(&key).is_none_or(|current| {
                (langcode.preference(&record.langcode), record.pid)
                    < (langcode.preference(&current.langcode), current.pid)
            });
            if replace {
                best.insert(key, record);
            }
        }

        paths
            .iter()
            .filter_map(|path| {
                best.get(&fold(path))
                    .map(|record| (path.clone(), record.alias.clone()))
            })
            .collect()
    }

    pub(crate) fn alias_exists(
        &self,
        alias: &str,
        langcode: &LangCode,
        source: Option<&str>,
        contexts_path: Option<&str>,
    ) -> bool {
        self.candidates(langcode, contexts_path).any(|record| {
            eq_fold(&record.alias, alias) && source.is_none_or(|s| !eq_fold(&record.source, s))
        })
    }

    pub(crate) fn language_alias_exists(&self) -> bool {
        self.aliases
            .values()
            .any(|record| !record.langcode.is_not_specified())
    }

    pub(crate) fn list_aliases(
        &self,
        filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AliasEntry>, StorageError> {
        let pattern = filter.map(filter_pattern).transpose()?;
        let mut records: Vec<&AliasRecord> = self
            .aliases
            .values()
            .filter(|record| pattern.as_ref().is_none_or(|re| re.is_match(&record.alias)))
            .collect();
        records.sort_by(|a, b| a.alias.cmp(&b.alias).then(a.pid.cmp(&b.pid)));
        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|record| self.entry(record))
            .collect())
    }

    pub(crate) fn top_level_segments(&self) -> BTreeSet<String> {
        self.aliases
            .values()
            .filter_map(|record| {
                record
                    .source
                    .trim_start_matches('/')
                    .split('/')
                    .next()
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .collect()
    }

    fn associations_of(&self, pid: Pid) -> impl Iterator<Item = &ContextPathAssociation> {
        let lower = ContextPathAssociation {
            pid,
            contexts_path: String::new(),
            weight: i32::MIN,
        };
        self.associations
            .range(lower..)
            .take_while(move |a| a.pid == pid)
    }

    fn in_scope(&self, pid: Pid, contexts_path: Option<&str>) -> bool {
        match scope(contexts_path) {
            Some(path) => self.associations_of(pid).any(|a| a.contexts_path == path),
            None => true,
        }
    }

    /// Rows visible to `langcode` under the language fallback rule.
    fn candidates<'a>(
        &'a self,
        langcode: &'a LangCode,
        contexts_path: Option<&'a str>,
    ) -> impl Iterator<Item = &'a AliasRecord> + 'a {
        self.aliases.values().filter(move |record| {
            langcode.accepts(&record.langcode) && self.in_scope(record.pid, contexts_path)
        })
    }

    fn matching<'a>(
        &'a self,
        conditions: &'a AliasConditions,
    ) -> impl Iterator<Item = &'a AliasRecord> + 'a {
        self.aliases.values().filter(move |record| {
            conditions.pid.is_none_or(|pid| record.pid == pid)
                && conditions
                    .source
                    .as_deref()
                    .is_none_or(|s| eq_fold(&record.source, s))
                && conditions
                    .alias
                    .as_deref()
                    .is_none_or(|a| eq_fold(&record.alias, a))
                && conditions
                    .langcode
                    .as_ref()
                    .is_none_or(|l| &record.langcode == l)
                && self.in_scope(record.pid, conditions.contexts_path.as_deref())
        })
    }

    fn entry(&self, record: &AliasRecord) -> AliasEntry {
        let mut contexts: Vec<_> = self.associations_of(record.pid).cloned().collect();
        contexts.sort_by(|a, b| {
            a.weight
                .cmp(&b.weight)
                .then_with(|| a.contexts_path.cmp(&b.contexts_path))
        });
        AliasEntry {
            record: record.clone(),
            contexts,
        }
    }
}

/// Case-insensitive substring pattern with `*` wildcards; runs of `*` collapse.
fn filter_pattern(filter: &str) -> Result<Regex, StorageError> {
    let body = filter
        .split('*')
        .filter(|piece| !piece.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?i){body}"))
        .map_err(|e| StorageError::BackendError(format!("invalid alias filter: {e}")))
}

/// Broadcasts the configured tag after every mutation.
#[derive(Clone)]
pub(crate) struct Invalidation {
    sink: Arc<dyn CacheTagInvalidator>,
    tag: String,
}

impl Invalidation {
    pub(crate) fn new(sink: Arc<dyn CacheTagInvalidator>, tag: impl Into<String>) -> Self {
        Self {
            sink,
            tag: tag.into(),
        }
    }

    /// An invalidation whose sink discards every tag.
    pub(crate) fn silent() -> Self {
        Self::new(Arc::new(Discard), crate::config::DEFAULT_INVALIDATION_TAG)
    }

    pub(crate) fn fire(&self) {
        tracing::debug!(tag = %self.tag, "invalidating cache tag");
        self.sink.invalidate_tags(&[self.tag.as_str()]);
    }
}

impl std::fmt::Debug for Invalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidation")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

struct Discard;

impl CacheTagInvalidator for Discard {
    fn invalidate_tags(&self, _tags: &[&str]) {}
}
