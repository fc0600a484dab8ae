//! Typed wire frame definitions for the transport connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use utalk_core::types::{ClientRef, ConversationId, MessageId, UserId};
use utalk_entity::message::{Attachment, Message, MessageKind};
use utalk_entity::presence::PresenceStatus;

/// Frames sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opening handshake with credentials.
    Hello {
        /// Bearer token obtained at login.
        token: String,
        /// User identifier.
        email: String,
    },
    /// Send a message, expecting an acknowledgement.
    SendMessage {
        /// Idempotency key; echoed back in the ack.
        #[serde(rename = "ref")]
        client_ref: ClientRef,
        /// Target conversation.
        conversation_id: ConversationId,
        /// Message body.
        content: String,
        /// Content kind.
        kind: MessageKind,
        /// Attachments.
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    /// Typing indicator for the authenticated user.
    Typing {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Whether typing started or stopped.
        is_typing: bool,
    },
    /// Presence update for the authenticated user.
    Presence {
        /// New status.
        status: PresenceStatus,
    },
    /// Subscribe to a conversation's live message stream.
    Subscribe {
        /// Conversation to watch.
        conversation_id: ConversationId,
    },
    /// Unsubscribe from a conversation's live message stream.
    Unsubscribe {
        /// Conversation to stop watching.
        conversation_id: ConversationId,
    },
    /// Pong response to a server ping.
    Pong {
        /// Echoed timestamp.
        timestamp: i64,
    },
}

impl ClientFrame {
    /// The correlation key an acknowledgement for this frame will carry,
    /// if the frame is acknowledged at all.
    pub fn ack_key(&self) -> Option<String> {
        match self {
            Self::SendMessage { client_ref, .. } => Some(client_ref.to_string()),
            _ => None,
        }
    }
}

/// Frames sent by the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    HelloOk {
        /// The authenticated user.
        user_id: UserId,
    },
    /// Handshake rejected: credentials are invalid or expired.
    AuthError {
        /// Human-readable reason.
        message: String,
    },
    /// Acknowledgement for an emitted frame.
    Ack {
        /// Correlation key of the acknowledged frame.
        #[serde(rename = "ref")]
        client_ref: ClientRef,
        /// Whether the server persisted the request.
        success: bool,
        /// Durable message id, on success.
        message_id: Option<MessageId>,
        /// Server-assigned timestamp, on success.
        timestamp: Option<DateTime<Utc>>,
        /// Failure reason, on rejection.
        error: Option<String>,
    },
    /// A new message arrived in a conversation.
    MessageNew {
        /// The message record.
        message: Message,
    },
    /// Delivery/read receipt for an existing message.
    MessageStatus {
        /// The conversation holding the message.
        conversation_id: ConversationId,
        /// The message the receipt refers to.
        message_id: MessageId,
        /// `"delivered"` or `"read"`.
        status: String,
    },
    /// Full snapshot of a subscribed conversation's messages.
    ConversationSnapshot {
        /// The conversation the snapshot describes.
        conversation_id: ConversationId,
        /// All current records, unordered; malformed entries are kept as
        /// raw JSON so one bad record cannot poison the batch.
        messages: Vec<serde_json::Value>,
    },
    /// Presence change for another user.
    PresenceChanged {
        /// The user whose presence changed.
        user_id: UserId,
        /// New status.
        status: PresenceStatus,
    },
    /// Typing indicator from another user.
    Typing {
        /// The user typing.
        user_id: UserId,
        /// The conversation being typed in.
        conversation_id: ConversationId,
        /// Whether typing started or stopped.
        is_typing: bool,
    },
    /// Server keepalive.
    Ping {
        /// Server timestamp.
        timestamp: i64,
    },
    /// Server-initiated disconnect. The client reconnects proactively.
    Bye {
        /// Why the server is closing the connection.
        reason: String,
    },
}

/// Result of an emit-with-ack.
#[derive(Debug, Clone, PartialEq)]
pub struct AckResponse {
    /// Whether the server persisted the request.
    pub success: bool,
    /// Durable message id, on success.
    pub message_id: Option<MessageId>,
    /// Server-assigned timestamp, on success.
    pub timestamp: Option<DateTime<Utc>>,
    /// Failure reason, on rejection.
    pub error: Option<String>,
}
