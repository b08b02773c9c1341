//! Error types for pitwall-state

use thiserror::Error;

/// Errors raised while opening or preparing the league database
#[derive(Error, Debug)]
pub enum StateError {
    /// Could not reach, sign in to, or select the database
    #[error("league database unavailable: {0}")]
    Connection(String),

    #[error("league database query failed: {0}")]
    Query(String),

    #[error("could not encode league record: {0}")]
    Serialization(String),

    /// A `DEFINE` statement was rejected
    #[error("league schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced through the `LeagueStore` trait
#[derive(Error, Debug)]
pub enum StorageError {
    /// A referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record failed a store-level integrity check
    #[error("invalid {kind} {id}: {reason}")]
    InvalidRecord {
        kind: &'static str,
        id: String,
        reason: String,
    },

    /// Any failure reported by the underlying backend
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True when the error means the record is absent rather than unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
