//! REST backend collaborator.
//!
//! JSON over HTTPS, credentialed with a bearer token.  Wire DTOs mirror the
//! backend's camelCase shapes and are converted into domain types right
//! here, at the boundary; in particular the channel kind is derived exactly
//! once from the redundant `isDM` flag / `dm:` prefix pair.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use atrium_shared::{Channel, ChannelId, Config, Message};

use crate::error::Result;

/// The subset of the backend this core needs.  A trait so tests (and
/// offline tooling) can substitute an in-memory backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET` the channel roster of a project.
    async fn fetch_channels(&self, project_id: &str) -> Result<Vec<Channel>>;

    /// `GET` the full message log of a channel.
    async fn fetch_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>>;

    /// Authenticated `POST` of a new message; returns the stored message.
    async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<Message>;

    /// Create a new multi-party channel in a project.
    async fn create_channel(&self, project_id: &str, name: &str) -> Result<Channel>;
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChannelDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "isDM")]
    is_dm: bool,
}

impl From<ChannelDto> for Channel {
    fn from(dto: ChannelDto) -> Self {
        Channel::classify(ChannelId::new(dto.id), &dto.name, dto.is_dm)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelBody<'a> {
    name: &'a str,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Concrete [`ChatBackend`] over reqwest.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn fetch_channels(&self, project_id: &str) -> Result<Vec<Channel>> {
        let dtos: Vec<ChannelDto> = self
            .http
            .get(self.url(&format!("/api/projects/{project_id}/channels")))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(project = project_id, count = dtos.len(), "fetched channel roster");
        Ok(dtos.into_iter().map(Channel::from).collect())
    }

    async fn fetch_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>> {
        let messages: Vec<Message> = self
            .http
            .get(self.url(&format!("/api/channels/{channel_id}/messages")))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(channel = %channel_id, count = messages.len(), "fetched message log");
        Ok(messages)
    }

    async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<Message> {
        let message: Message = self
            .http
            .post(self.url(&format!("/api/channels/{channel_id}/messages")))
            .bearer_auth(&self.token)
            .json(&SendMessageBody { text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(channel = %channel_id, msg_id = %message.id, "message sent");
        Ok(message)
    }

    async fn create_channel(&self, project_id: &str, name: &str) -> Result<Channel> {
        let dto: ChannelDto = self
            .http
            .post(self.url(&format!("/api/projects/{project_id}/channels")))
            .bearer_auth(&self.token)
            .json(&CreateChannelBody { name })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(project = project_id, channel = %dto.id, "channel created");
        Ok(dto.into())
    }
}
