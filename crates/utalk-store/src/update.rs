//! Store change notifications.

use utalk_core::types::ConversationId;

/// A change notification emitted by the store.
///
/// Updates carry only the key that changed, never the data: subscribers
/// re-read current state through the store's accessors, so a notification
/// that raced with a later mutation can never deliver stale values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    /// The message list of a conversation changed.
    MessagesChanged {
        /// The conversation whose messages changed.
        conversation_id: ConversationId,
    },
    /// Conversation-level state (unread count, status, assignment) changed.
    ConversationChanged {
        /// The conversation that changed.
        conversation_id: ConversationId,
    },
    /// The entire store was cleared (session teardown).
    Cleared,
}
