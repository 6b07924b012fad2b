//! Context negotiation.
//!
//! A context is a positioned path segment (`/store-a/warehouse-3/...`) that
//! scopes alias resolution. The negotiator derives the active stack from a
//! request path and renders the "contexts path" used as URL prefix and cache
//! key dimension.

mod model;
mod negotiator;
mod paths;
mod source;

pub use model::{Context, ContextStack};
pub use negotiator::ContextNegotiator;
pub use paths::{contexts_paths, validate_sequence};
pub use source::{ContextSource, InMemoryContextSource};
