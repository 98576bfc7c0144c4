//! Storage scopes.

use serde::{Deserialize, Serialize};

/// Who a persisted session belongs to.
///
/// Anonymous sessions share one scope; a signed-in user gets a scope
/// keyed by their id so switching accounts never mixes sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageScope {
    Anonymous,
    User(String),
}

impl StorageScope {
    /// Stable key used in file names.
    pub fn key(&self) -> String {
        match self {
            Self::Anonymous => "anon".to_string(),
            Self::User(id) => format!("user-{id}"),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}
