//! REST API boundary for the message fallback path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use utalk_core::config::api::ApiConfig;
use utalk_core::types::{ClientRef, ConversationId, MessageId};
use utalk_entity::message::{Attachment, MessageKind, Sender};
use utalk_core::{AppError, AppResult};

/// Request body for creating a message over REST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Message body.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Idempotency key: the same logical message may reach the server twice
    /// (a lost ack followed by the fallback POST); the server collapses the
    /// pair on this reference.
    pub client_ref: ClientRef,
}

/// The created message resource as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResource {
    /// Durable message id.
    pub id: MessageId,
    /// The conversation the message was created in.
    pub conversation_id: ConversationId,
    /// Message body.
    pub content: String,
    /// Who authored the message.
    pub sender: Sender,
    /// Content kind.
    pub kind: MessageKind,
    /// Server-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// Echo of the idempotency key, when the server stores one.
    #[serde(default)]
    pub client_ref: Option<ClientRef>,
}

/// The REST operations the messaging pipeline depends on.
#[async_trait]
pub trait MessageApi: Send + Sync + 'static {
    /// `POST /conversations/{id}/messages`.
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        message: &NewMessage,
    ) -> AppResult<MessageResource>;
}

/// reqwest-backed implementation of [`MessageApi`].
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpMessageApi {
    /// Build the API client from configuration and the session bearer token.
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        message: &NewMessage,
    ) -> AppResult<MessageResource> {
        let url = format!("{}/conversations/{}/messages", self.base_url, conversation_id);
        debug!(%conversation_id, client_ref = %message.client_ref, "REST fallback POST");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::network(format!("Message POST failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(AppError::authentication("Message POST rejected: 401"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::api(format!(
                "Message POST returned {status}: {body}"
            )));
        }

        response
            .json::<MessageResource>()
            .await
            .map_err(|e| AppError::api(format!("Malformed message resource: {e}")))
    }
}
