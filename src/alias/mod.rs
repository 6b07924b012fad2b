//! Alias records, their context associations, and the request types used to
//! write and query them.

mod record;
mod request;

pub use record::{AliasEntry, AliasRecord, ContextPathAssociation, Pid};
pub(crate) use request::normalize_contexts_path;
pub use request::{AliasConditions, SaveOperation, SaveOutcome, SaveRequest};
