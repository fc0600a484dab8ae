//! In-process session event channel.
//!
//! Any component that detects an invalid session (a 401 from the REST
//! boundary, a rejected transport handshake, an explicit logout) publishes
//! one `Invalidated` message here; the session teardown handler is the
//! consumer. This replaces ambient cross-surface signaling with a single
//! explicit channel.

use tokio::sync::broadcast;
use tracing::info;

use utalk_core::events::{SessionEndReason, SessionEvent};

/// Publish/subscribe channel for session lifecycle events.
#[derive(Debug, Clone)]
pub struct SessionBroadcast {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBroadcast {
    /// Create a channel with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when no consumer is listening.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish the teardown signal.
    pub fn invalidate(&self, reason: SessionEndReason) {
        info!(?reason, "Session invalidated");
        self.publish(SessionEvent::Invalidated { reason });
    }
}

impl Default for SessionBroadcast {
    fn default() -> Self {
        Self::new(16)
    }
}
