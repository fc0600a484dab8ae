//! Presence tracker — user status and per-conversation typing sets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use utalk_core::types::{ConversationId, UserId};
use utalk_entity::presence::{PresenceRecord, PresenceStatus};

/// A live typing entry: the expiry timer plus the epoch that created it.
///
/// The epoch lets an already-fired timer detect that it lost a race with a
/// reset or an explicit stop, so a stale expiry can never remove (or have
/// ever resurrected) a newer entry.
struct TypingEntry {
    epoch: u64,
    timer: JoinHandle<()>,
}

struct TrackerInner {
    ttl: Duration,
    epoch: AtomicU64,
    records: DashMap<UserId, PresenceRecord>,
    /// Conversation → set of typing users. Conversations with empty sets are
    /// removed outright; no empty-set entries persist.
    typing: Mutex<HashMap<ConversationId, HashMap<UserId, TypingEntry>>>,
}

/// Tracks presence and typing state for all known users.
///
/// Mutated only by inbound transport events; every typing start (re)arms a
/// TTL timer for its `(conversation, user)` pair.
pub struct PresenceTracker {
    inner: Arc<TrackerInner>,
}

impl PresenceTracker {
    /// Create a tracker with the given typing TTL.
    pub fn new(typing_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ttl: typing_ttl,
                epoch: AtomicU64::new(0),
                records: DashMap::new(),
                typing: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Update a user's presence status.
    ///
    /// Going offline also clears any typing state the user held.
    pub fn update_presence(&self, user_id: UserId, status: PresenceStatus) {
        if status == PresenceStatus::Offline {
            self.set_typing_stopped_everywhere(user_id);
        }
        self.inner
            .records
            .entry(user_id)
            .and_modify(|r| {
                r.status = status;
                r.last_seen_at = Utc::now();
            })
            .or_insert_with(|| PresenceRecord::new(user_id, status));
    }

    /// Get a user's current status.
    pub fn status(&self, user_id: UserId) -> PresenceStatus {
        self.inner
            .records
            .get(&user_id)
            .map(|r| r.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Get a snapshot of a user's presence record.
    pub fn record(&self, user_id: UserId) -> Option<PresenceRecord> {
        self.inner.records.get(&user_id).map(|r| r.clone())
    }

    /// Start or stop a user's typing indicator in a conversation.
    pub fn set_typing(&self, user_id: UserId, conversation_id: ConversationId, is_typing: bool) {
        if is_typing {
            self.start_typing(user_id, conversation_id);
        } else {
            self.stop_typing(user_id, conversation_id);
        }
    }

    /// Users currently typing in a conversation.
    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.inner
            .typing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&conversation_id)
            .map(|set| set.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether anyone is typing in a conversation.
    pub fn is_anyone_typing(&self, conversation_id: ConversationId) -> bool {
        self.inner
            .typing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&conversation_id)
    }

    fn start_typing(&self, user_id: UserId, conversation_id: ConversationId) {
        // A user types in at most one conversation: leaving the previous
        // one is part of entering the new one.
        let previous = self
            .inner
            .records
            .get(&user_id)
            .and_then(|r| r.typing_in)
            .filter(|prev| *prev != conversation_id);
        if let Some(prev) = previous {
            self.stop_typing(user_id, prev);
        }

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = spawn_expiry(
            Arc::downgrade(&self.inner),
            user_id,
            conversation_id,
            epoch,
            self.inner.ttl,
        );

        {
            let mut typing = self.inner.typing.lock().unwrap_or_else(|e| e.into_inner());
            let set = typing.entry(conversation_id).or_default();
            // Reset-by-restart: the prior timer is aborted before the new
            // one takes its place, so rapid-fire events never leak timers.
            if let Some(old) = set.insert(user_id, TypingEntry { epoch, timer }) {
                old.timer.abort();
            }
        }

        self.inner
            .records
            .entry(user_id)
            .and_modify(|r| {
                r.typing_in = Some(conversation_id);
                r.last_seen_at = Utc::now();
            })
            .or_insert_with(|| {
                let mut record = PresenceRecord::new(user_id, PresenceStatus::Online);
                record.typing_in = Some(conversation_id);
                record
            });
    }

    fn stop_typing(&self, user_id: UserId, conversation_id: ConversationId) {
        let removed = {
            let mut typing = self.inner.typing.lock().unwrap_or_else(|e| e.into_inner());
            let removed = match typing.get_mut(&conversation_id) {
                Some(set) => set.remove(&user_id),
                None => None,
            };
            if typing
                .get(&conversation_id)
                .is_some_and(|set| set.is_empty())
            {
                typing.remove(&conversation_id);
            }
            removed
        };

        if let Some(entry) = removed {
            entry.timer.abort();
        }

        if let Some(mut record) = self.inner.records.get_mut(&user_id) {
            if record.typing_in == Some(conversation_id) {
                record.typing_in = None;
            }
        }
    }

    fn set_typing_stopped_everywhere(&self, user_id: UserId) {
        let conversation = self.inner.records.get(&user_id).and_then(|r| r.typing_in);
        if let Some(conversation_id) = conversation {
            self.stop_typing(user_id, conversation_id);
        }
    }
}

/// Arm the TTL timer for one typing entry.
///
/// Holds only a weak reference so a dropped tracker tears its timers down
/// with it.
fn spawn_expiry(
    inner: Weak<TrackerInner>,
    user_id: UserId,
    conversation_id: ConversationId,
    epoch: u64,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let expired = {
            let mut typing = inner.typing.lock().unwrap_or_else(|e| e.into_inner());
            let expired = match typing.get_mut(&conversation_id) {
                // Only the entry this timer was armed for may be removed; a
                // newer epoch means the indicator was refreshed meanwhile.
                Some(set) if set.get(&user_id).is_some_and(|e| e.epoch == epoch) => {
                    set.remove(&user_id);
                    true
                }
                _ => false,
            };
            if typing
                .get(&conversation_id)
                .is_some_and(|set| set.is_empty())
            {
                typing.remove(&conversation_id);
            }
            expired
        };

        if expired {
            debug!(%user_id, %conversation_id, "Typing indicator expired");
            if let Some(mut record) = inner.records.get_mut(&user_id) {
                if record.typing_in == Some(conversation_id) {
                    record.typing_in = None;
                }
            }
        }
    })
}
