//! Per-user session tracking.
//!
//! Each chat user has one session holding the most recently uploaded
//! document and the ordered set of documents waiting to be merged.

#[allow(clippy::module_inception)]
mod session;
mod store;

pub use session::{DocumentRef, Session, SessionId};
pub use store::DocumentStore;
