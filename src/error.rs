//! Error types for ctxalias.
//!
//! Argument problems surface as [`ValidationError`], backend failures as
//! [`StorageError`]. Both fold into [`CtxError`] so callers can match on the
//! layer that failed.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors raised for malformed arguments.
///
/// These are fatal to the call that received them, never to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} path '{value}' has to start with a slash")]
    MissingLeadingSlash {
        field: &'static str,
        value: String,
    },

    #[error("Invalid context id '{id}': only letters, digits, '_' and '-' are allowed")]
    InvalidContextId {
        id: String,
    },

    #[error("Language code cannot be empty")]
    EmptyLangcode,

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    /// Checks that `value` starts with `/`, naming `field` in the error.
    ///
    /// # Errors
    /// - `MissingLeadingSlash`: If `value` does not start with `/`
    pub fn require_leading_slash(field: &'static str, value: &str) -> Result<(), Self> {
        if value.starts_with('/') {
            Ok(())
        } else {
            Err(Self::MissingLeadingSlash {
                field,
                value: value.to_string(),
            })
        }
    }
}

/// Top-level error type for ctxalias.
#[derive(Debug, Error)]
pub enum CtxError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CtxError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Storage(e) => matches!(e, StorageError::ConnectionError(_)),
        }
    }
}

/// Result type alias for ctxalias operations.
pub type CtxResult<T> = Result<T, CtxError>;
