//! Per-request context negotiation.

use std::sync::Arc;

use super::{contexts_paths, validate_sequence, Context, ContextSource, ContextStack};

/// Derives and holds the context stack for one request.
///
/// A negotiator is built per request and never shared between requests.
/// Negotiation runs at most once; later calls are no-ops.
pub struct ContextNegotiator {
    source: Arc<dyn ContextSource>,
    stack: ContextStack,
    initialized: bool,
    inconsistent: bool,
    valid: bool,
}

impl ContextNegotiator {
    /// Create a negotiator with an empty, valid stack.
    #[must_use]
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self {
            source,
            stack: ContextStack::new(),
            initialized: false,
            inconsistent: false,
            valid: true,
        }
    }

    /// Negotiate the stack from a request path or URI.
    ///
    /// A leading segment equal to `langcode` or `lang_prefix` is skipped. Each
    /// following segment that names a context at the next expected position is
    /// pushed; the first segment that is not a context ends negotiation. A
    /// context found at the wrong position also ends it and marks the stack
    /// inconsistent, keeping what was negotiated so far.
    pub fn negotiate_contexts(&mut self, path: &str, langcode: &str, lang_prefix: Option<&str>) {
        if self.initialized {
            return;
        }
        let (path, _) = split_query(path);
        let mut segments = split_segments(path);
        if let Some(first) = segments.first() {
            if *first == langcode || Some(*first) == lang_prefix {
                segments.remove(0);
            }
        }
        self.negotiate_segments(&segments);
    }

    /// Strip the negotiated context prefix from `path`.
    ///
    /// Removes the leading run of segments that equal the stack's ids in stack
    /// order and returns the rest, keeping any query or fragment. A path with
    /// no such prefix is returned unchanged. Negotiates first when that has not
    /// happened yet for this request.
    pub fn process_path_inbound(&mut self, path: &str) -> String {
        let (route, suffix) = split_query(path);
        let segments = split_segments(route);
        let consumed = if self.initialized {
            segments
                .iter()
                .zip(self.stack.contexts())
                .take_while(|(segment, context)| **segment == context.id)
                .count()
        } else {
            self.negotiate_segments(&segments)
        };
        if consumed == 0 {
            return path.to_string();
        }
        format!("{}{suffix}", join_segments(&segments[consumed..]))
    }

    /// Load a context by id, treating a failed lookup as absent.
    #[must_use]
    pub fn load_context(&self, id: &str) -> Option<Context> {
        match self.source.load_context(id) {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(context_id = %id, error = %e, "context lookup failed");
                None
            }
        }
    }

    /// The negotiated stack.
    #[must_use]
    pub fn contexts(&self) -> &ContextStack {
        &self.stack
    }

    /// The fullest contexts path for `contexts`, or for the current stack when
    /// `None`. Returns `None` when the sequence fails [`Self::validate`] or
    /// yields no path.
    #[must_use]
    pub fn get_contexts_path(&self, contexts: Option<&[Context]>) -> Option<String> {
        let owned;
        let contexts = match contexts {
            Some(contexts) => contexts,
            None => {
                owned = self.stack.to_vec();
                owned.as_slice()
            }
        };
        if !validate_sequence(contexts.iter().enumerate()) {
            return None;
        }
        contexts_paths(contexts).pop()
    }

    /// Replace the stack and re-validate it.
    pub fn set_contexts(&mut self, stack: ContextStack) {
        self.stack = stack;
        self.revalidate();
    }

    /// Place a context at its own position, replacing any occupant.
    pub fn insert_context(&mut self, context: Context) -> Option<Context> {
        let replaced = self.stack.insert(context);
        self.revalidate();
        replaced
    }

    /// Remove the deepest context.
    pub fn pop_context(&mut self) -> Option<Context> {
        let popped = self.stack.pop();
        self.revalidate();
        popped
    }

    /// Whether a context with this id is on the stack.
    #[must_use]
    pub fn has_context(&self, id: &str) -> bool {
        self.stack.contains(id)
    }

    /// Validate `contexts`, or the current stack when `None`: each element's
    /// position equals its index and indices run from 0 without gaps.
    #[must_use]
    pub fn validate(&self, contexts: Option<&[Context]>) -> bool {
        match contexts {
            Some(contexts) => validate_sequence(contexts.iter().enumerate()),
            None => self.stack.is_contiguous(),
        }
    }

    /// Result of the last validation of the stack.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether negotiation stopped at a context with an unexpected position.
    #[must_use]
    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    /// Whether negotiation has run for this request.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the number of segments consumed as contexts.
    fn negotiate_segments(&mut self, segments: &[&str]) -> usize {
        let mut stack = ContextStack::new();
        let mut inconsistent = false;
        for segment in segments {
            let Some(context) = self.load_context(segment) else {
                break;
            };
            let expected = stack.len();
            if usize::try_from(context.position).ok() != Some(expected) {
                tracing::warn!(
                    context_id = %context.id,
                    expected,
                    actual = context.position,
                    "context position mismatch, negotiation halted"
                );
                inconsistent = true;
                break;
            }
            stack.push(context);
        }
        let consumed = stack.len();
        tracing::debug!(contexts = ?stack.ids(), inconsistent, "contexts negotiated");
        self.inconsistent = inconsistent;
        self.set_contexts(stack);
        self.initialized = true;
        consumed
    }

    fn revalidate(&mut self) {
        self.valid = self.stack.is_contiguous();
    }
}

impl std::fmt::Debug for ContextNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextNegotiator")
            .field("stack", &self.stack)
            .field("initialized", &self.initialized)
            .field("inconsistent", &self.inconsistent)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

/// Split `uri` before its query or fragment.
fn split_query(uri: &str) -> (&str, &str) {
    uri.find(['?', '#']).map_or((uri, ""), |at| uri.split_at(at))
}

fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn join_segments(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}
