//! Scoped on-disk persistence for drafts and in-flight renders.
//!
//! Each storage scope (anonymous session or signed-in user) owns one
//! JSON file. Loads are lenient: a malformed render entry is discarded
//! silently rather than poisoning the rest of the session.

pub mod scope;
pub mod store;

pub use scope::StorageScope;
pub use store::{LocalStore, SessionState, StoreError};
