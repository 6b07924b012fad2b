//! Language codes used as a resolution dimension.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A language code such as `en` or `de`.
///
/// The special code [`LangCode::NOT_SPECIFIED`] (`und`) marks language-neutral
/// aliases. Lookups for a specific language fall back to neutral rows; lookups
/// for the neutral code only see neutral rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LangCode(String);

impl LangCode {
    /// The language-neutral code.
    pub const NOT_SPECIFIED: &'static str = "und";

    /// Creates a language code from trimmed input.
    ///
    /// # Errors
    /// - `EmptyLangcode`: If `code` is empty or blank
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyLangcode);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The language-neutral code.
    #[must_use]
    pub fn not_specified() -> Self {
        Self(Self::NOT_SPECIFIED.to_string())
    }

    /// Returns true for the language-neutral code.
    #[must_use]
    pub fn is_not_specified(&self) -> bool {
        self.0 == Self::NOT_SPECIFIED
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a stored row with `stored` language is visible to a lookup in
    /// this language.
    #[must_use]
    pub fn accepts(&self, stored: &LangCode) -> bool {
        stored == self || (!self.is_not_specified() && stored.is_not_specified())
    }

    /// Sort rank of a visible row: exact-language rows come before neutral ones.
    #[must_use]
    pub fn preference(&self, stored: &LangCode) -> u8 {
        u8::from(stored != self)
    }
}

impl Default for LangCode {
    fn default() -> Self {
        Self::not_specified()
    }
}

impl fmt::Display for LangCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LangCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for LangCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
