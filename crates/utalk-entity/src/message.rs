//! Message entity and its optimistic-send lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use utalk_core::types::{AttachmentId, ClientRef, ConversationId, MessageId};

/// Identity of a message in the local store.
///
/// A message is created under a locally-generated [`ClientRef`] and swapped
/// to the server-assigned [`MessageId`] once any send path confirms
/// persistence. The two variants are the same logical message; the store
/// guarantees at most one live record exists for either key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalMessageId {
    /// Durable, server-assigned identity.
    Server(MessageId),
    /// Optimistic, client-assigned identity (`temp_<millis>_<rand>`).
    Local(ClientRef),
}

impl LocalMessageId {
    /// Whether the server has confirmed this message.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// The server id, if confirmed.
    pub fn as_server_id(&self) -> Option<MessageId> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl std::fmt::Display for LocalMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(r) => write!(f, "{r}"),
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// A dashboard agent.
    Agent,
    /// The customer on the other end of the conversation.
    Customer,
}

/// Content kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Audio clip.
    Audio,
    /// Video clip.
    Video,
    /// Generic file.
    File,
    /// Structured document.
    Document,
}

/// Delivery status of a message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Optimistically inserted, no send path has completed yet.
    Sending,
    /// A send path confirmed server persistence.
    Sent,
    /// The recipient's device acknowledged delivery.
    Delivered,
    /// The recipient read the message.
    Read,
    /// All send paths failed; eligible for manual retry.
    Error,
}

impl MessageStatus {
    /// Whether the send pipeline still owns this record.
    ///
    /// Once a record leaves `Sending`, late signals from an abandoned send
    /// path must not touch it.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Sending)
    }
}

/// An attachment carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment identifier.
    pub id: AttachmentId,
    /// Original file name.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// A message inside a conversation, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Local identity (temporary until confirmed).
    pub id: LocalMessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// The client reference, retained after confirmation for inbound dedup.
    ///
    /// Records that never originated on this client (customer messages in a
    /// stream snapshot) carry no reference on the wire; deserialization
    /// assigns a fresh one so every local record stays uniquely addressable.
    #[serde(default = "ClientRef::generate")]
    pub client_ref: ClientRef,
    /// Message body.
    pub content: String,
    /// Who authored the message.
    pub sender: Sender,
    /// Content kind.
    pub kind: MessageKind,
    /// Ordering timestamp. Client-assigned until the server confirms.
    pub timestamp: DateTime<Utc>,
    /// Delivery status.
    pub status: MessageStatus,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// How many send attempts have failed for this logical message.
    #[serde(default)]
    pub retry_count: u32,
    /// Why the last send attempt failed, if status is `Error`.
    #[serde(default)]
    pub error_reason: Option<String>,
}

impl Message {
    /// Create an optimistic outbound message with a fresh client reference.
    pub fn outgoing(
        conversation_id: ConversationId,
        content: impl Into<String>,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) -> Self {
        let client_ref = ClientRef::generate();
        Self {
            id: LocalMessageId::Local(client_ref.clone()),
            conversation_id,
            client_ref,
            content: content.into(),
            sender: Sender::Agent,
            kind,
            timestamp: Utc::now(),
            status: MessageStatus::Sending,
            attachments,
            retry_count: 0,
            error_reason: None,
        }
    }

    /// Swap to the server identity and mark sent.
    ///
    /// The server timestamp replaces the optimistic one so display ordering
    /// follows server-assigned time.
    pub fn confirm(&mut self, server_id: MessageId, server_timestamp: DateTime<Utc>) {
        self.id = LocalMessageId::Server(server_id);
        self.timestamp = server_timestamp;
        self.status = MessageStatus::Sent;
        self.error_reason = None;
    }

    /// Mark the record failed, retaining the reason and counting the attempt.
    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.status = MessageStatus::Error;
        self.error_reason = Some(reason.into());
        self.retry_count += 1;
    }

    /// Put a failed record back into flight for a manual retry.
    pub fn mark_retrying(&mut self) {
        self.status = MessageStatus::Sending;
        self.error_reason = None;
    }
}
