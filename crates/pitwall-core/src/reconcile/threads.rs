//! External thread reconciliation.
//!
//! Stored thread handles are verified before reuse. A definitive "not found"
//! invalidates a handle: a replacement is created and swapped in on every race
//! that referenced the old one. Any other failure counts as "still exists" so
//! a flaky chat service never causes duplicate threads.

use std::sync::Arc;

use pitwall_chat::{ChatService, EditOutcome, OutgoingMessage};
use pitwall_state::{LeagueStore, ThreadHandle};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs;

/// How a thread was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThreadOutcome {
    /// The stored handle still resolves
    Reused,
    /// No handle was stored; a new thread was created
    Created,
    /// The stored handle was gone; a replacement was created and propagated
    Replaced {
        previous: ThreadHandle,
        races_updated: usize,
    },
}

/// How a status message reached its thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOutcome {
    Edited,
    Posted,
    /// The thread vanished mid-update and was recreated with the status
    Recreated,
}

impl StatusOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusOutcome::Edited => "edited",
            StatusOutcome::Posted => "posted",
            StatusOutcome::Recreated => "recreated",
        }
    }
}

/// Result of a status upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDelivery {
    /// Thread holding the status after the upsert (changes on recreation)
    pub thread: ThreadHandle,
    pub outcome: StatusOutcome,
}

/// Verifies, recreates, and posts into chat threads.
pub struct ThreadReconciler {
    store: Arc<dyn LeagueStore>,
    chat: Arc<dyn ChatService>,
    parent_id: String,
    marker: String,
    message_window: usize,
}

impl ThreadReconciler {
    pub fn new(
        store: Arc<dyn LeagueStore>,
        chat: Arc<dyn ChatService>,
        parent_id: impl Into<String>,
        marker: impl Into<String>,
        message_window: usize,
    ) -> Self {
        ThreadReconciler {
            store,
            chat,
            parent_id: parent_id.into(),
            marker: marker.into(),
            message_window,
        }
    }

    /// Type marker stamped on status messages
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Existence check that only trusts a definitive answer.
    pub async fn still_exists(&self, handle: &ThreadHandle) -> bool {
        match self.chat.resource_exists(handle.as_str()).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(thread = %handle, error = %e, "Existence check failed; keeping handle");
                true
            }
        }
    }

    /// Return a usable thread, creating one when `existing` is absent or gone.
    ///
    /// A new thread is seeded with `initial`. Replacements are propagated to
    /// every race through [`LeagueStore::replace_thread_handle`]; brand-new
    /// threads are left for the caller to bind.
    pub async fn ensure_thread(
        &self,
        existing: Option<&ThreadHandle>,
        title: &str,
        initial: &OutgoingMessage,
    ) -> Result<(ThreadHandle, ThreadOutcome)> {
        let Some(handle) = existing else {
            let created = self.create(title, initial).await?;
            return Ok((created, ThreadOutcome::Created));
        };

        if self.still_exists(handle).await {
            debug!(thread = %handle, "Reusing thread");
            return Ok((handle.clone(), ThreadOutcome::Reused));
        }

        let (replacement, races_updated) = self.replace(handle, title, initial).await?;
        Ok((
            replacement,
            ThreadOutcome::Replaced {
                previous: handle.clone(),
                races_updated,
            },
        ))
    }

    /// Edit the prior status message in place, or post a new one.
    ///
    /// If the thread or the message disappears during the update, the thread
    /// is recreated with `message` as its first message.
    pub async fn upsert_status(
        &self,
        handle: &ThreadHandle,
        title: &str,
        message: &OutgoingMessage,
    ) -> Result<StatusDelivery> {
        let recent = match self
            .chat
            .list_recent_messages(handle.as_str(), self.message_window)
            .await
        {
            Ok(recent) => recent,
            Err(e) if e.is_not_found() => {
                return self.recreate_with_status(handle, title, message).await
            }
            Err(e) => return Err(e.into()),
        };

        let prior = recent.iter().find(|m| {
            m.author_is_automation && m.type_marker.as_deref() == Some(self.marker.as_str())
        });

        let outcome = match prior {
            Some(prior) => {
                match self
                    .chat
                    .edit_message(handle.as_str(), &prior.id, message)
                    .await?
                {
                    EditOutcome::Edited => {
                        METRICS.inc_status_edits();
                        StatusOutcome::Edited
                    }
                    EditOutcome::NotFound => {
                        return self.recreate_with_status(handle, title, message).await
                    }
                }
            }
            None => match self.chat.post_message(handle.as_str(), message).await {
                Ok(_) => {
                    METRICS.inc_status_posts();
                    StatusOutcome::Posted
                }
                Err(e) if e.is_not_found() => {
                    return self.recreate_with_status(handle, title, message).await
                }
                Err(e) => return Err(e.into()),
            },
        };

        obs::emit_status_upserted(handle.as_str(), outcome.as_str());
        Ok(StatusDelivery {
            thread: handle.clone(),
            outcome,
        })
    }

    async fn recreate_with_status(
        &self,
        handle: &ThreadHandle,
        title: &str,
        message: &OutgoingMessage,
    ) -> Result<StatusDelivery> {
        let (thread, _) = self.replace(handle, title, message).await?;
        obs::emit_status_upserted(thread.as_str(), StatusOutcome::Recreated.as_str());
        Ok(StatusDelivery {
            thread,
            outcome: StatusOutcome::Recreated,
        })
    }

    async fn create(&self, title: &str, initial: &OutgoingMessage) -> Result<ThreadHandle> {
        let handle = self
            .chat
            .create_resource(&self.parent_id, title, initial)
            .await?;
        Ok(ThreadHandle::new(handle))
    }

    async fn replace(
        &self,
        old: &ThreadHandle,
        title: &str,
        initial: &OutgoingMessage,
    ) -> Result<(ThreadHandle, usize)> {
        let replacement = self.create(title, initial).await?;
        let races_updated = self.store.replace_thread_handle(old, &replacement).await?;
        METRICS.inc_threads_recreated();
        obs::emit_thread_replaced(old.as_str(), replacement.as_str(), races_updated);
        Ok((replacement, races_updated))
    }
}
