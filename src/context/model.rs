//! Context values and the per-request stack.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Namespace for deriving stable context UUIDs from ids.
const CONTEXT_NAMESPACE: Uuid = Uuid::from_u128(0x6c0e_7a3b_52d1_4f0a_9a2e_c7d4_1b83_e5f6);

fn is_valid_context_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A named, positioned path segment.
///
/// Within a negotiated stack, the context at index `n` has `position == n`.
///
/// # Examples
///
/// ```
/// use ctxalias::Context;
///
/// let store = Context::new("store-a", "Store A", 0).unwrap();
/// assert_eq!(store.cache_tags(), vec!["context:store-a".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Machine name; doubles as the URL segment.
    pub id: String,
    /// Human readable label.
    pub label: String,
    /// Zero-based slot in the context stack.
    pub position: u32,
    /// Stable identifier derived from `id`.
    pub uuid: Uuid,
}

impl Context {
    /// Creates a context.
    ///
    /// # Errors
    /// - `InvalidContextId`: If `id` cannot be a single URL segment
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        position: u32,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if !is_valid_context_id(&id) {
            return Err(ValidationError::InvalidContextId { id });
        }
        let uuid = Uuid::new_v5(&CONTEXT_NAMESPACE, id.as_bytes());
        Ok(Self {
            id,
            label: label.into(),
            position,
            uuid,
        })
    }

    /// Cache tags downstream render caches should attach.
    #[must_use]
    pub fn cache_tags(&self) -> Vec<String> {
        vec![format!("context:{}", self.id)]
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.position)
    }
}

/// Ordered contexts keyed by slot.
///
/// Slots are normally contiguous from 0, but [`ContextStack::insert`] may leave
/// gaps; [`ContextStack::is_contiguous`] reports whether the stack is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStack {
    slots: BTreeMap<u32, Context>,
}

impl ContextStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a stack from contexts in order; slot `n` holds the `n`th element.
    #[must_use]
    pub fn from_sequence(contexts: impl IntoIterator<Item = Context>) -> Self {
        let slots = (0u32..).zip(contexts).collect();
        Self { slots }
    }

    /// Appends at the next free slot.
    pub fn push(&mut self, context: Context) {
        let slot = self.next_slot();
        self.slots.insert(slot, context);
    }

    /// Places a context at the slot named by its own position, replacing any
    /// occupant. Returns the replaced context.
    pub fn insert(&mut self, context: Context) -> Option<Context> {
        self.slots.insert(context.position, context)
    }

    /// Removes and returns the context in the highest slot.
    pub fn pop(&mut self) -> Option<Context> {
        self.slots.pop_last().map(|(_, context)| context)
    }

    /// Whether a context with the same id is on the stack.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.values().any(|c| c.id == id)
    }

    /// Number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no context has been negotiated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates `(slot, context)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Context)> {
        self.slots.iter().map(|(slot, context)| (*slot, context))
    }

    /// Contexts in slot order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.slots.values()
    }

    /// Context ids in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.slots.values().map(|c| c.id.as_str()).collect()
    }

    /// Copies the contexts out in slot order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Context> {
        self.slots.values().cloned().collect()
    }

    /// Slots run 0..n without gaps and each context sits at its own position.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        super::validate_sequence(self.iter().map(|(slot, c)| (slot as usize, c)))
    }

    fn next_slot(&self) -> u32 {
        self.slots.keys().next_back().map_or(0, |last| last + 1)
    }
}
