//! Conversation entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use utalk_core::types::{ConversationId, UserId};

use crate::message::Message;

/// Workflow status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Actively being worked.
    Open,
    /// Waiting on the customer or a third party.
    Pending,
    /// Closed with a resolution.
    Resolved,
    /// Removed from active views.
    Archived,
}

/// A customer conversation as tracked by the local store.
///
/// The message list itself lives in the store; this entity carries the
/// conversation-level aggregates (unread count, last-message snapshot,
/// assignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// The customer on the other end.
    pub customer_id: Option<UserId>,
    /// The agent currently assigned.
    pub assignee: Option<UserId>,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Workflow status.
    pub status: ConversationStatus,
    /// Messages received but not yet seen by the agent.
    #[serde(default)]
    pub unread_count: u32,
    /// Snapshot of the most recent message, for list rendering.
    #[serde(default)]
    pub last_message: Option<Message>,
    /// When the conversation last changed.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an open conversation with no activity yet.
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            customer_id: None,
            assignee: None,
            tags: Vec::new(),
            status: ConversationStatus::Open,
            unread_count: 0,
            last_message: None,
            updated_at: Utc::now(),
        }
    }

    /// Refresh the last-message snapshot and bump the update time.
    pub fn touch_last_message(&mut self, message: &Message) {
        self.last_message = Some(message.clone());
        self.updated_at = Utc::now();
    }
}
