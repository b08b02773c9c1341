//! Domain-level error taxonomy for Pitwall.

use pitwall_chat::ChatError;
use pitwall_state::{StorageError, TeamId};

/// Pitwall domain errors.
#[derive(Debug, thiserror::Error)]
pub enum LeagueError {
    /// Malformed input, rejected before any state is read
    #[error("validation error: {0}")]
    Validation(String),

    /// A non-admin attempted an admin-only mutation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The team is bound to an active chat thread
    #[error("conflict on team {team_id}: {reason}")]
    Conflict { team_id: TeamId, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeagueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LeagueError::Validation(msg.into())
    }

    pub fn conflict(team_id: &TeamId, reason: impl Into<String>) -> Self {
        LeagueError::Conflict {
            team_id: team_id.clone(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for LeagueError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => LeagueError::NotFound(format!("{kind} {id}")),
            other => LeagueError::Storage(other),
        }
    }
}

impl From<ChatError> for LeagueError {
    fn from(err: ChatError) -> Self {
        LeagueError::Chat(err.to_string())
    }
}

/// Result type for Pitwall domain operations.
pub type Result<T> = std::result::Result<T, LeagueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_record_maps_to_not_found() {
        let err: LeagueError = StorageError::not_found("race", "r-404").into();
        assert!(matches!(err, LeagueError::NotFound(_)));
        assert!(err.to_string().contains("r-404"));
    }

    #[test]
    fn test_backend_failure_stays_storage() {
        let err: LeagueError = StorageError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, LeagueError::Storage(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_conflict_names_team() {
        let err = LeagueError::conflict(&TeamId::from("t-red"), "thread is active");
        let msg = err.to_string();
        assert!(msg.contains("t-red"));
        assert!(msg.contains("thread is active"));
    }
}
