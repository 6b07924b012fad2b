//! Runtime configuration.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tag broadcast on alias mutations unless configured otherwise.
pub const DEFAULT_INVALIDATION_TAG: &str = "route_match";

/// Configuration shared by every request scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextsConfig {
    /// URL path prefix per language code (`de` -> `deutsch`). Languages without
    /// an entry are only stripped when the first segment equals the code itself.
    pub language_prefixes: BTreeMap<String, String>,
    /// Lifetime of a persisted preload entry, in seconds.
    pub preload_ttl_secs: u64,
    /// Cache tag broadcast on every alias mutation.
    pub invalidation_tag: String,
    /// Prefix prepended to preload cache keys.
    pub preload_key_prefix: String,
    /// Page size used by alias listings.
    pub admin_page_size: usize,
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            language_prefixes: BTreeMap::new(),
            preload_ttl_secs: 60 * 60 * 24, // 24 hours
            invalidation_tag: DEFAULT_INVALIDATION_TAG.to_string(),
            preload_key_prefix: "preload-paths:".to_string(),
            admin_page_size: 50,
        }
    }
}

impl ContextsConfig {
    /// Parses configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// - `InvalidConfig`: If the JSON is malformed or a value is out of range
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            field: "<root>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()
    }

    /// Checks value ranges, returning the config unchanged on success.
    ///
    /// # Errors
    /// - `InvalidConfig`: naming the first field that is out of range
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.preload_ttl_secs == 0 {
            return Err(invalid("preload_ttl_secs", "must be greater than zero"));
        }
        if i64::try_from(self.preload_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .is_none()
        {
            return Err(invalid("preload_ttl_secs", "out of range"));
        }
        if self.invalidation_tag.trim().is_empty() {
            return Err(invalid("invalidation_tag", "cannot be empty"));
        }
        if self.admin_page_size == 0 {
            return Err(invalid("admin_page_size", "must be greater than zero"));
        }
        if let Some((code, _)) = self
            .language_prefixes
            .iter()
            .find(|(_, prefix)| prefix.contains('/'))
        {
            return Err(invalid(
                "language_prefixes",
                &format!("prefix for '{code}' must be a single path segment"),
            ));
        }
        Ok(self)
    }

    /// The URL prefix configured for a language, if any.
    #[must_use]
    pub fn language_prefix(&self, langcode: &str) -> Option<&str> {
        self.language_prefixes.get(langcode).map(String::as_str)
    }

    /// Preload entry lifetime.
    #[must_use]
    pub fn preload_ttl(&self) -> Duration {
        i64::try_from(self.preload_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
