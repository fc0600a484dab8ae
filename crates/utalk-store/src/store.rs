//! In-memory conversation/message store.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use utalk_core::types::{ClientRef, ConversationId, MessageId};
use utalk_entity::conversation::Conversation;
use utalk_entity::message::{LocalMessageId, Message, MessageStatus};

use crate::update::StoreUpdate;

/// Per-conversation state held by the store.
#[derive(Debug)]
struct ConversationState {
    conversation: Conversation,
    /// Ordered ascending by timestamp. Ties keep insertion order.
    messages: Vec<Message>,
}

impl ConversationState {
    fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            messages: Vec::new(),
        }
    }

    fn resort(&mut self) {
        // Stable sort: equal timestamps keep their relative order.
        self.messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    fn refresh_last_message(&mut self) {
        if let Some(last) = self.messages.last() {
            self.conversation.last_message = Some(last.clone());
            self.conversation.updated_at = Utc::now();
        }
    }

    fn position_by_server_id(&self, id: MessageId) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id.as_server_id() == Some(id))
    }

    fn position_by_client_ref(&self, client_ref: &ClientRef) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| &m.client_ref == client_ref)
    }
}

/// The client-side store for conversations and their messages.
///
/// All mutation goes through methods on this type; every method takes the
/// internal lock, re-reads current state, applies its patch, and notifies
/// subscribers. Subscribers receive keys, not data, and re-read through the
/// accessors.
#[derive(Debug)]
pub struct ConversationStore {
    inner: Mutex<HashMap<ConversationId, ConversationState>>,
    /// The conversation currently open in the UI, if any. Inbound messages
    /// for the selected conversation are seen immediately and never count
    /// as unread.
    selected: Mutex<Option<ConversationId>>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ConversationStore {
    /// Create a store with the given update-channel capacity.
    pub fn new(update_buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(update_buffer);
        Self {
            inner: Mutex::new(HashMap::new()),
            selected: Mutex::new(None),
            updates,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, ConversationState>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, update: StoreUpdate) {
        // No receivers is fine; the store does not require observers.
        let _ = self.updates.send(update);
    }

    // ── Conversation-level operations ────────────────────────────

    /// Insert or replace a conversation, keeping any existing message list.
    pub fn upsert_conversation(&self, conversation: Conversation) {
        let id = conversation.id;
        {
            let mut map = self.lock();
            match map.get_mut(&id) {
                Some(state) => state.conversation = conversation,
                None => {
                    map.insert(id, ConversationState::new(conversation));
                }
            }
        }
        self.notify(StoreUpdate::ConversationChanged {
            conversation_id: id,
        });
    }

    /// Read a conversation snapshot.
    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().get(&id).map(|s| s.conversation.clone())
    }

    /// Read the ordered message list of a conversation.
    pub fn messages(&self, id: ConversationId) -> Vec<Message> {
        self.lock()
            .get(&id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Find a message by client reference.
    pub fn message_by_client_ref(
        &self,
        id: ConversationId,
        client_ref: &ClientRef,
    ) -> Option<Message> {
        let map = self.lock();
        let state = map.get(&id)?;
        let pos = state.position_by_client_ref(client_ref)?;
        Some(state.messages[pos].clone())
    }

    /// Mark a conversation selected: its unread count drops to zero
    /// immediately, before any server round-trip.
    pub fn select_conversation(&self, id: ConversationId) {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);
        let changed = {
            let mut map = self.lock();
            match map.get_mut(&id) {
                Some(state) if state.conversation.unread_count != 0 => {
                    state.conversation.unread_count = 0;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notify(StoreUpdate::ConversationChanged {
                conversation_id: id,
            });
        }
    }

    /// Leave the currently selected conversation, if any.
    pub fn deselect_conversation(&self) {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// The currently selected conversation.
    pub fn selected_conversation(&self) -> Option<ConversationId> {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count an unseen inbound message unless its conversation is the one
    /// currently open, which the agent is looking at already.
    pub fn increment_unread(&self, id: ConversationId) {
        if self.selected_conversation() == Some(id) {
            return;
        }
        let present = {
            let mut map = self.lock();
            match map.get_mut(&id) {
                Some(state) => {
                    state.conversation.unread_count += 1;
                    true
                }
                None => false,
            }
        };
        if present {
            self.notify(StoreUpdate::ConversationChanged {
                conversation_id: id,
            });
        }
    }

    /// Drop all state. Used by session teardown.
    pub fn clear(&self) {
        self.lock().clear();
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.notify(StoreUpdate::Cleared);
    }

    // ── Outbound pipeline operations ─────────────────────────────

    /// Insert an optimistic outbound record.
    ///
    /// Synchronous by design: the caller inserts before any network I/O so
    /// the UI reflects the attempt immediately. The conversation is created
    /// on the fly if it is not known yet.
    pub fn insert_optimistic(&self, message: Message) {
        let conversation_id = message.conversation_id;
        {
            let mut map = self.lock();
            let state = map
                .entry(conversation_id)
                .or_insert_with(|| ConversationState::new(Conversation::new(conversation_id)));
            if state.position_by_client_ref(&message.client_ref).is_some() {
                warn!(client_ref = %message.client_ref, "Duplicate optimistic insert ignored");
                return;
            }
            state.messages.push(message);
            state.resort();
            state.refresh_last_message();
        }
        self.notify(StoreUpdate::MessagesChanged { conversation_id });
    }

    /// Collapse an optimistic record into its server-confirmed identity.
    ///
    /// Total and idempotent: confirming an already-confirmed message, a
    /// record a late signal no longer owns, or an unknown reference is a
    /// no-op. Returns whether the record changed.
    pub fn reconcile(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
        server_id: MessageId,
        server_timestamp: DateTime<Utc>,
    ) -> bool {
        let applied = {
            let mut map = self.lock();
            let Some(state) = map.get_mut(&conversation_id) else {
                return false;
            };

            // The server id already lives in the store: a previous reconcile
            // or an inbound snapshot won the race. The optimistic twin may
            // still exist if the snapshot arrived first; collapse the pair
            // down to one record.
            if state.position_by_server_id(server_id).is_some() {
                match state.position_by_client_ref(client_ref) {
                    Some(pos) if !state.messages[pos].id.is_confirmed() => {
                        state.messages.remove(pos);
                        state.resort();
                        state.refresh_last_message();
                        true
                    }
                    _ => false,
                }
            } else {
                match state.position_by_client_ref(client_ref) {
                    Some(pos) if state.messages[pos].status.is_pending() => {
                        state.messages[pos].confirm(server_id, server_timestamp);
                        state.resort();
                        state.refresh_last_message();
                        true
                    }
                    // Terminal record: a late ack from an abandoned path.
                    _ => false,
                }
            }
        };

        if applied {
            debug!(%client_ref, %server_id, "Reconciled optimistic message");
            self.notify(StoreUpdate::MessagesChanged { conversation_id });
        }
        applied
    }

    /// Mark an in-flight record failed, counting the attempt.
    ///
    /// A record that already left `Sending` is not touched; a late failure
    /// signal from an abandoned path is a no-op. Returns the new retry count
    /// when applied.
    pub fn mark_error(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
        reason: &str,
    ) -> Option<u32> {
        let result = {
            let mut map = self.lock();
            let state = map.get_mut(&conversation_id)?;
            let pos = state.position_by_client_ref(client_ref)?;
            if !state.messages[pos].status.is_pending() {
                return None;
            }
            state.messages[pos].mark_error(reason);
            Some(state.messages[pos].retry_count)
        };

        if result.is_some() {
            self.notify(StoreUpdate::MessagesChanged { conversation_id });
        }
        result
    }

    /// Put a failed record back into flight for a retry attempt.
    ///
    /// Only an `Error` record can re-enter the pipeline. Returns the record
    /// as it is after the transition.
    pub fn begin_retry(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
    ) -> Option<Message> {
        let message = {
            let mut map = self.lock();
            let state = map.get_mut(&conversation_id)?;
            let pos = state.position_by_client_ref(client_ref)?;
            if state.messages[pos].status != MessageStatus::Error {
                return None;
            }
            state.messages[pos].mark_retrying();
            Some(state.messages[pos].clone())
        };

        if message.is_some() {
            self.notify(StoreUpdate::MessagesChanged { conversation_id });
        }
        message
    }

    // ── Inbound reconciliation operations ────────────────────────

    /// Upsert a single server-confirmed record arriving from the live stream.
    ///
    /// Dedup follows the same identity rules as [`Self::merge_snapshot`]:
    /// match by server id first, then by client reference.
    pub fn upsert_inbound(&self, message: Message) {
        let conversation_id = message.conversation_id;
        {
            let mut map = self.lock();
            let state = map
                .entry(conversation_id)
                .or_insert_with(|| ConversationState::new(Conversation::new(conversation_id)));
            apply_inbound(state, message);
            state.resort();
            state.refresh_last_message();
        }
        self.notify(StoreUpdate::MessagesChanged { conversation_id });
    }

    /// Merge a full snapshot from the live source into the local list.
    ///
    /// Incremental diff-by-id: changed records are upserted in place,
    /// records that vanished server-side are removed, and local records the
    /// server has never confirmed (pending or failed optimistic entries)
    /// survive the merge untouched.
    pub fn merge_snapshot(&self, conversation_id: ConversationId, incoming: Vec<Message>) {
        {
            let mut map = self.lock();
            let state = map
                .entry(conversation_id)
                .or_insert_with(|| ConversationState::new(Conversation::new(conversation_id)));

            let incoming_ids: Vec<MessageId> =
                incoming.iter().filter_map(|m| m.id.as_server_id()).collect();

            for message in incoming {
                apply_inbound(state, message);
            }

            // Confirmed records absent from the snapshot vanished server-side.
            state.messages.retain(|m| match m.id.as_server_id() {
                Some(id) => incoming_ids.contains(&id),
                None => true,
            });

            state.resort();
            state.refresh_last_message();
        }
        self.notify(StoreUpdate::MessagesChanged { conversation_id });
    }

    /// Apply a delivery/read receipt to a confirmed record.
    ///
    /// Receipts only move a record forward (sent → delivered → read); a
    /// receipt that arrives out of order never downgrades.
    pub fn apply_receipt(
        &self,
        conversation_id: ConversationId,
        server_id: MessageId,
        status: MessageStatus,
    ) {
        let applied = {
            let mut map = self.lock();
            let Some(state) = map.get_mut(&conversation_id) else {
                return;
            };
            let Some(pos) = state.position_by_server_id(server_id) else {
                return;
            };
            let current = state.messages[pos].status;
            if receipt_rank(status) > receipt_rank(current) {
                state.messages[pos].status = status;
                true
            } else {
                false
            }
        };

        if applied {
            self.notify(StoreUpdate::MessagesChanged { conversation_id });
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Upsert one inbound record into a conversation state.
///
/// Identity resolution order: server id, then client reference. A pending
/// optimistic twin collapses into the server record; its retry counter
/// carries over so the cap survives reconciliation.
fn apply_inbound(state: &mut ConversationState, message: Message) {
    if let Some(server_id) = message.id.as_server_id() {
        if let Some(pos) = state.position_by_server_id(server_id) {
            let retry_count = state.messages[pos].retry_count;
            let current = state.messages[pos].status;
            let mut updated = message;
            updated.retry_count = retry_count;
            // Keep the furthest delivery state we have seen.
            if receipt_rank(current) > receipt_rank(updated.status) {
                updated.status = current;
            }
            state.messages[pos] = updated;
            return;
        }
        if let Some(pos) = state.position_by_client_ref(&message.client_ref) {
            if !state.messages[pos].id.is_confirmed() {
                let retry_count = state.messages[pos].retry_count;
                let mut updated = message;
                updated.retry_count = retry_count;
                state.messages[pos] = updated;
                return;
            }
        }
    }
    state.messages.push(message);
}

/// Forward-only ordering for delivery receipts.
fn receipt_rank(status: MessageStatus) -> u8 {
    match status {
        MessageStatus::Sending => 0,
        MessageStatus::Error => 0,
        MessageStatus::Sent => 1,
        MessageStatus::Delivered => 2,
        MessageStatus::Read => 3,
    }
}
