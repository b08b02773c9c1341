//! Error types for pitwall-chat

use thiserror::Error;

/// Errors that can occur talking to the chat service
#[derive(Error, Debug)]
pub enum ChatError {
    /// The thread or message is definitively gone
    #[error("Chat resource not found: {resource}")]
    NotFound { resource: String },

    /// Transport-level failure (timeout, connection reset, DNS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with an unexpected status
    #[error("Chat API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Client is missing required configuration
    #[error("Chat client is not configured: {0}")]
    Config(String),

    /// Response body could not be decoded
    #[error("JSON parsing error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ChatError::NotFound {
            resource: resource.into(),
        }
    }

    /// True only for a definitive "not found" answer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::NotFound { .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Http(err.to_string())
    }
}
