//! Inbound stream reconciliation.
//!
//! Consumes the live per-conversation message stream and folds it into the
//! local store. Snapshots merge incrementally by id — changed records are
//! upserted, vanished ones removed — so a tick never duplicates a pending
//! optimistic record and never rebuilds the whole list.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use utalk_core::types::ConversationId;
use utalk_core::AppResult;
use utalk_entity::message::{Message, MessageStatus, Sender};
use utalk_store::ConversationStore;
use utalk_transport::client::Transport;
use utalk_transport::frames::{ClientFrame, ServerFrame};

/// Reconciles the live inbound stream with the local store.
pub struct InboundReconciler {
    transport: Arc<dyn Transport>,
    store: Arc<ConversationStore>,
    /// Conversations with a live subscription. At most one per conversation.
    active: Mutex<HashSet<ConversationId>>,
}

impl InboundReconciler {
    /// Wire the reconciler to its collaborators.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<ConversationStore>) -> Self {
        Self {
            transport,
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe to a conversation's live message stream.
    ///
    /// At most one subscription per conversation is live at a time;
    /// subscribing again refreshes the existing one.
    pub async fn subscribe(&self, conversation_id: ConversationId) -> AppResult<()> {
        if !self.lock_active().insert(conversation_id) {
            debug!(%conversation_id, "Refreshing live subscription");
        }
        self.transport
            .send(ClientFrame::Subscribe { conversation_id })
            .await
    }

    /// Unsubscribe from a conversation's live message stream.
    ///
    /// Idempotent: unsubscribing a conversation that is not subscribed is a
    /// no-op and does not touch the wire.
    pub async fn unsubscribe(&self, conversation_id: ConversationId) -> AppResult<()> {
        if !self.lock_active().remove(&conversation_id) {
            return Ok(());
        }
        self.transport
            .send(ClientFrame::Unsubscribe { conversation_id })
            .await
    }

    /// Whether a conversation currently has a live subscription.
    pub fn is_subscribed(&self, conversation_id: ConversationId) -> bool {
        self.lock_active().contains(&conversation_id)
    }

    /// Drop every live subscription without touching the wire. Used by
    /// session teardown, where the link is going away anyway.
    pub fn clear(&self) {
        self.lock_active().clear();
    }

    /// Fold one inbound frame into the store.
    ///
    /// Unrelated frames are ignored; a malformed record inside a snapshot is
    /// skipped with a warning and never crashes the subscription.
    pub fn handle_frame(&self, frame: &ServerFrame) {
        match frame {
            ServerFrame::ConversationSnapshot {
                conversation_id,
                messages,
            } => {
                if !self.is_subscribed(*conversation_id) {
                    debug!(%conversation_id, "Dropping snapshot for unsubscribed conversation");
                    return;
                }
                let mapped: Vec<Message> = messages
                    .iter()
                    .filter_map(|raw| map_record(raw))
                    .collect();
                let skipped = messages.len() - mapped.len();
                if skipped > 0 {
                    warn!(%conversation_id, skipped, "Skipped malformed snapshot records");
                }
                self.store.merge_snapshot(*conversation_id, mapped);
            }
            ServerFrame::MessageNew { message } => {
                let conversation_id = message.conversation_id;
                let from_customer = message.sender == Sender::Customer;
                self.store.upsert_inbound(message.clone());
                if from_customer {
                    self.store.increment_unread(conversation_id);
                }
            }
            ServerFrame::MessageStatus {
                conversation_id,
                message_id,
                status,
            } => {
                let Some(status) = parse_receipt(status) else {
                    warn!(%message_id, status, "Ignoring unknown receipt status");
                    return;
                };
                self.store
                    .apply_receipt(*conversation_id, *message_id, status);
            }
            _ => {}
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<ConversationId>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Map one raw stream record to a message, or skip it.
fn map_record(raw: &serde_json::Value) -> Option<Message> {
    match serde_json::from_value::<Message>(raw.clone()) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "Skipping malformed stream record");
            None
        }
    }
}

fn parse_receipt(status: &str) -> Option<MessageStatus> {
    match status {
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        _ => None,
    }
}
