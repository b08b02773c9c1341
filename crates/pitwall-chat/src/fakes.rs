//! In-memory chat service for tests.
//!
//! Records every call so tests can assert on what was (and was not) sent,
//! and supports deleting threads or messages behind the caller's back plus
//! injecting transient failures.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChatError, ChatResult, ChatService, EditOutcome, MessageSummary, OutgoingMessage};

/// A message held by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub author_is_automation: bool,
    pub marker: Option<String>,
    pub content: String,
}

/// A thread held by the fake
#[derive(Debug, Clone, Default)]
pub struct FakeThread {
    pub parent_id: String,
    pub title: String,
    /// Oldest first
    pub messages: Vec<StoredMessage>,
    pub participants: Vec<String>,
}

/// One recorded call against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    ResourceExists(String),
    CreateResource { parent_id: String, title: String },
    ListRecent(String),
    Edit { handle: String, message_id: String },
    Post(String),
    AddParticipants { handle: String, users: Vec<String> },
}

impl ChatCall {
    /// Calls that change state on the service
    pub fn is_write(&self) -> bool {
        !matches!(self, ChatCall::ResourceExists(_) | ChatCall::ListRecent(_))
    }
}

#[derive(Default)]
struct ChatData {
    threads: BTreeMap<String, FakeThread>,
    next_id: u64,
    pending_failures: usize,
}

impl ChatData {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory [`ChatService`]
#[derive(Default)]
pub struct MemoryChatService {
    data: Mutex<ChatData>,
    calls: Mutex<Vec<ChatCall>>,
}

impl MemoryChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thread that already exists on the service.
    pub fn insert_thread(&self, handle: &str, parent_id: &str, title: &str) {
        let mut data = self.data.lock().unwrap();
        data.threads.insert(
            handle.to_string(),
            FakeThread {
                parent_id: parent_id.to_string(),
                title: title.to_string(),
                ..Default::default()
            },
        );
    }

    /// Simulate a moderator deleting a thread.
    pub fn delete_thread(&self, handle: &str) -> bool {
        self.data.lock().unwrap().threads.remove(handle).is_some()
    }

    /// Simulate a moderator deleting a single message.
    pub fn delete_message(&self, handle: &str, message_id: &str) -> bool {
        let mut data = self.data.lock().unwrap();
        match data.threads.get_mut(handle) {
            Some(thread) => {
                let before = thread.messages.len();
                thread.messages.retain(|m| m.id != message_id);
                thread.messages.len() != before
            }
            None => false,
        }
    }

    /// Post a message authored by a human user.
    pub fn post_human_message(&self, handle: &str, content: &str) -> Option<String> {
        let mut data = self.data.lock().unwrap();
        let id = data.next("msg");
        let thread = data.threads.get_mut(handle)?;
        thread.messages.push(StoredMessage {
            id: id.clone(),
            author_is_automation: false,
            marker: None,
            content: content.to_string(),
        });
        Some(id)
    }

    /// Make the next `count` calls fail with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.data.lock().unwrap().pending_failures = count;
    }

    pub fn thread(&self, handle: &str) -> Option<FakeThread> {
        self.data.lock().unwrap().threads.get(handle).cloned()
    }

    pub fn thread_handles(&self) -> Vec<String> {
        self.data.lock().unwrap().threads.keys().cloned().collect()
    }

    pub fn messages(&self, handle: &str) -> Vec<StoredMessage> {
        self.thread(handle).map(|t| t.messages).unwrap_or_default()
    }

    pub fn participants(&self, handle: &str) -> Vec<String> {
        self.thread(handle).map(|t| t.participants).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of state-changing calls recorded so far
    pub fn write_count(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ChatCall) -> ChatResult<()> {
        self.calls.lock().unwrap().push(call);
        let mut data = self.data.lock().unwrap();
        if data.pending_failures > 0 {
            data.pending_failures -= 1;
            return Err(ChatError::Http("injected transient failure".to_string()));
        }
        Ok(())
    }
}

fn automation_message(id: String, message: &OutgoingMessage) -> StoredMessage {
    StoredMessage {
        id,
        author_is_automation: true,
        marker: message.marker.clone(),
        content: message.content.clone(),
    }
}

#[async_trait]
impl ChatService for MemoryChatService {
    async fn resource_exists(&self, handle: &str) -> ChatResult<bool> {
        self.record(ChatCall::ResourceExists(handle.to_string()))?;
        Ok(self.data.lock().unwrap().threads.contains_key(handle))
    }

    async fn create_resource(
        &self,
        parent_id: &str,
        title: &str,
        initial: &OutgoingMessage,
    ) -> ChatResult<String> {
        self.record(ChatCall::CreateResource {
            parent_id: parent_id.to_string(),
            title: title.to_string(),
        })?;
        let mut data = self.data.lock().unwrap();
        let handle = data.next("thread");
        let message_id = data.next("msg");
        data.threads.insert(
            handle.clone(),
            FakeThread {
                parent_id: parent_id.to_string(),
                title: title.to_string(),
                messages: vec![automation_message(message_id, initial)],
                participants: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn list_recent_messages(
        &self,
        handle: &str,
        limit: usize,
    ) -> ChatResult<Vec<MessageSummary>> {
        self.record(ChatCall::ListRecent(handle.to_string()))?;
        let data = self.data.lock().unwrap();
        let thread = data
            .threads
            .get(handle)
            .ok_or_else(|| ChatError::not_found(handle))?;
        Ok(thread
            .messages
            .iter()
            .rev()
            .take(limit)
            .map(|m| MessageSummary {
                id: m.id.clone(),
                author_is_automation: m.author_is_automation,
                type_marker: m.marker.clone(),
            })
            .collect())
    }

    async fn edit_message(
        &self,
        handle: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> ChatResult<EditOutcome> {
        self.record(ChatCall::Edit {
            handle: handle.to_string(),
            message_id: message_id.to_string(),
        })?;
        let mut data = self.data.lock().unwrap();
        let Some(thread) = data.threads.get_mut(handle) else {
            return Ok(EditOutcome::NotFound);
        };
        match thread.messages.iter_mut().find(|m| m.id == message_id) {
            Some(existing) => {
                existing.content = message.content.clone();
                existing.marker = message.marker.clone();
                Ok(EditOutcome::Edited)
            }
            None => Ok(EditOutcome::NotFound),
        }
    }

    async fn post_message(&self, handle: &str, message: &OutgoingMessage) -> ChatResult<String> {
        self.record(ChatCall::Post(handle.to_string()))?;
        let mut data = self.data.lock().unwrap();
        let id = data.next("msg");
        let thread = data
            .threads
            .get_mut(handle)
            .ok_or_else(|| ChatError::not_found(handle))?;
        thread.messages.push(automation_message(id.clone(), message));
        Ok(id)
    }

    async fn add_participants(&self, handle: &str, participant_ids: &[String]) -> ChatResult<()> {
        self.record(ChatCall::AddParticipants {
            handle: handle.to_string(),
            users: participant_ids.to_vec(),
        })?;
        let mut data = self.data.lock().unwrap();
        let thread = data
            .threads
            .get_mut(handle)
            .ok_or_else(|| ChatError::not_found(handle))?;
        for user in participant_ids {
            if !thread.participants.contains(user) {
                thread.participants.push(user.clone());
            }
        }
        Ok(())
    }
}
