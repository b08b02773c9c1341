//! REST chat client
//!
//! Talks to a Discord-style HTTP API. Threads are channels, messages carry
//! their type marker in a single embed footer (`pitwall:<marker>`) so the
//! automation can find its own status message again after a restart.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::{ChatError, ChatResult, ChatService, EditOutcome, MessageSummary, OutgoingMessage};

const MARKER_PREFIX: &str = "pitwall:";
const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Chat client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the REST API
    pub api_base: String,
    /// Bot token (sent as `Authorization: Bot <token>`)
    pub token: Option<String>,
    /// User id of the automation identity, used to recognise its own messages
    pub bot_user_id: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_base: std::env::var("PITWALL_CHAT_API")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            token: std::env::var("PITWALL_CHAT_TOKEN").ok(),
            bot_user_id: std::env::var("PITWALL_CHAT_BOT_ID").ok(),
        }
    }
}

impl ChatConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific API base
    pub fn new(api_base: &str) -> Self {
        ChatConfig {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: None,
            bot_user_id: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_bot_user_id(mut self, bot_user_id: &str) -> Self {
        self.bot_user_id = Some(bot_user_id.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
struct IdBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthorBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FooterBody {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedBody {
    footer: Option<FooterBody>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    id: String,
    author: AuthorBody,
    #[serde(default)]
    embeds: Vec<EmbedBody>,
}

impl MessageBody {
    fn into_summary(self, bot_user_id: Option<&str>) -> MessageSummary {
        let type_marker = self
            .embeds
            .iter()
            .filter_map(|e| e.footer.as_ref())
            .find_map(|f| f.text.strip_prefix(MARKER_PREFIX))
            .map(str::to_string);
        MessageSummary {
            author_is_automation: bot_user_id == Some(self.author.id.as_str()),
            id: self.id,
            type_marker,
        }
    }
}

fn message_payload(message: &OutgoingMessage) -> serde_json::Value {
    match &message.marker {
        Some(marker) => json!({
            "content": message.content,
            "embeds": [{ "footer": { "text": format!("{MARKER_PREFIX}{marker}") } }],
        }),
        None => json!({ "content": message.content, "embeds": [] }),
    }
}

/// HTTP implementation of [`ChatService`]
pub struct HttpChatClient {
    config: ChatConfig,
    http_client: reqwest::Client,
}

impl HttpChatClient {
    /// Create a new chat client
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| ChatError::Config("PITWALL_CHAT_TOKEN is not set".to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|e| ChatError::Config(format!("invalid token: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("pitwall-chat/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(HttpChatClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> ChatResult<Self> {
        Self::new(ChatConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Map a non-success response onto a `ChatError`, keeping 404 distinct.
    async fn check(response: reqwest::Response, resource: &str) -> ChatResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ChatError::not_found(resource));
        }
        let message = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), resource, "Chat API request failed");
        Err(ChatError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatService for HttpChatClient {
    #[instrument(skip(self))]
    async fn resource_exists(&self, handle: &str) -> ChatResult<bool> {
        let response = self
            .http_client
            .get(self.url(&format!("/channels/{handle}")))
            .send()
            .await?;
        match Self::check(response, handle).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, initial))]
    async fn create_resource(
        &self,
        parent_id: &str,
        title: &str,
        initial: &OutgoingMessage,
    ) -> ChatResult<String> {
        let response = self
            .http_client
            .post(self.url(&format!("/channels/{parent_id}/threads")))
            .json(&json!({
                "name": title,
                "auto_archive_duration": 10080,
                "message": message_payload(initial),
            }))
            .send()
            .await?;
        let body: IdBody = Self::check(response, parent_id).await?.json().await?;
        debug!(thread = %body.id, "Created thread");
        Ok(body.id)
    }

    #[instrument(skip(self))]
    async fn list_recent_messages(
        &self,
        handle: &str,
        limit: usize,
    ) -> ChatResult<Vec<MessageSummary>> {
        let response = self
            .http_client
            .get(self.url(&format!("/channels/{handle}/messages")))
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;
        let messages: Vec<MessageBody> = Self::check(response, handle).await?.json().await?;
        let bot = self.config.bot_user_id.as_deref();
        Ok(messages
            .into_iter()
            .take(limit)
            .map(|m| m.into_summary(bot))
            .collect())
    }

    #[instrument(skip(self, message))]
    async fn edit_message(
        &self,
        handle: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> ChatResult<EditOutcome> {
        let response = self
            .http_client
            .patch(self.url(&format!("/channels/{handle}/messages/{message_id}")))
            .json(&message_payload(message))
            .send()
            .await?;
        match Self::check(response, message_id).await {
            Ok(_) => Ok(EditOutcome::Edited),
            Err(e) if e.is_not_found() => Ok(EditOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, message))]
    async fn post_message(&self, handle: &str, message: &OutgoingMessage) -> ChatResult<String> {
        let response = self
            .http_client
            .post(self.url(&format!("/channels/{handle}/messages")))
            .json(&message_payload(message))
            .send()
            .await?;
        let body: IdBody = Self::check(response, handle).await?.json().await?;
        Ok(body.id)
    }

    #[instrument(skip(self))]
    async fn add_participants(&self, handle: &str, participant_ids: &[String]) -> ChatResult<()> {
        for user in participant_ids {
            let response = self
                .http_client
                .put(self.url(&format!("/channels/{handle}/thread-members/{user}")))
                .send()
                .await?;
            Self::check(response, handle).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_config_new_trims_slash() {
        let config = ChatConfig::new("https://chat.example.test/api/")
            .with_token("secret")
            .with_bot_user_id("42");
        assert_eq!(config.api_base, "https://chat.example.test/api");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.bot_user_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_client_requires_token() {
        let err = HttpChatClient::new(ChatConfig::new("http://localhost:1"))
            .err()
            .expect("missing token is a config error");
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_marker_is_carried_in_footer() {
        let payload = message_payload(
            &OutgoingMessage::new("Added Alice to Team Red.").with_marker("roster-status"),
        );
        assert_eq!(payload["embeds"][0]["footer"]["text"], "pitwall:roster-status");
        assert_eq!(payload["content"], "Added Alice to Team Red.");
    }

    #[test]
    fn test_summary_recognises_automation_marker() {
        let body: MessageBody = serde_json::from_value(json!({
            "id": "m1",
            "author": { "id": "42" },
            "embeds": [{ "footer": { "text": "pitwall:roster-status" } }],
        }))
        .unwrap();
        let summary = body.into_summary(Some("42"));
        assert!(summary.author_is_automation);
        assert_eq!(summary.type_marker.as_deref(), Some("roster-status"));

        let human: MessageBody = serde_json::from_value(json!({
            "id": "m2",
            "author": { "id": "7" },
        }))
        .unwrap();
        let summary = human.into_summary(Some("42"));
        assert!(!summary.author_is_automation);
        assert_eq!(summary.type_marker, None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient_not_missing() {
        let client =
            HttpChatClient::new(ChatConfig::new("http://127.0.0.1:1").with_token("t")).unwrap();
        let err = client.resource_exists("thread-1").await.unwrap_err();
        assert!(!err.is_not_found());
    }
}
