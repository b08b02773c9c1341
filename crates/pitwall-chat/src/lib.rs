//! Pitwall-Chat: the chat-service collaborator
//!
//! Status messages about team assignments are pushed into conversation
//! threads of an external chat service. This crate defines the contract the
//! core relies on ([`ChatService`]) plus two implementations:
//!
//! - [`HttpChatClient`]: REST client configured from the environment
//! - [`fakes::MemoryChatService`]: in-memory fake that records every call
//!
//! ## Layer 1 - External collaborators
//!
//! Focus: a "not found" answer must always be distinguishable from a
//! transient failure, because the reconciler only recreates threads on the
//! former.

mod error;
pub mod fakes;
mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::ChatError;
pub use http::{ChatConfig, HttpChatClient};

/// Result type for chat operations
pub type ChatResult<T> = std::result::Result<T, ChatError>;

/// A message as returned by a recent-history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    /// Whether the automation identity authored the message
    pub author_is_automation: bool,
    /// Type marker stamped on automation messages (e.g. "roster-status")
    pub type_marker: Option<String>,
}

/// Content of an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub marker: Option<String>,
    pub content: String,
}

impl OutgoingMessage {
    pub fn new(content: impl Into<String>) -> Self {
        OutgoingMessage {
            marker: None,
            content: content.into(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// Result of an in-place edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    /// The message (or its thread) no longer exists
    NotFound,
}

/// Chat-service contract.
///
/// Guarantees required of implementations:
/// - retrying an operation with identical content is harmless
/// - `resource_exists` returns `Ok(false)` only on a definitive "not found";
///   every other failure is an `Err`
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Check whether a thread still exists.
    async fn resource_exists(&self, handle: &str) -> ChatResult<bool>;

    /// Create a thread under `parent_id` seeded with `initial`. Returns its handle.
    async fn create_resource(
        &self,
        parent_id: &str,
        title: &str,
        initial: &OutgoingMessage,
    ) -> ChatResult<String>;

    /// Most recent messages of a thread, newest first, at most `limit`.
    async fn list_recent_messages(
        &self,
        handle: &str,
        limit: usize,
    ) -> ChatResult<Vec<MessageSummary>>;

    /// Replace the content of an existing message.
    async fn edit_message(
        &self,
        handle: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> ChatResult<EditOutcome>;

    /// Post a new message. Fails with `ChatError::NotFound` if the thread is gone.
    async fn post_message(&self, handle: &str, message: &OutgoingMessage) -> ChatResult<String>;

    /// Invite users into a thread.
    async fn add_participants(&self, handle: &str, participant_ids: &[String]) -> ChatResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_message_builder() {
        let msg = OutgoingMessage::new("Roster updated").with_marker("roster-status");
        assert_eq!(msg.content, "Roster updated");
        assert_eq!(msg.marker.as_deref(), Some("roster-status"));
    }
}
