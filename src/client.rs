//! The UTalk client session.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use utalk_core::config::AppConfig;
use utalk_core::error::ErrorKind;
use utalk_core::events::{SessionEndReason, SessionEvent};
use utalk_core::types::{ClientRef, ConversationId, UserId};
use utalk_core::AppResult;
use utalk_entity::conversation::Conversation;
use utalk_entity::message::{Attachment, Message, MessageKind};
use utalk_entity::presence::{PresenceRecord, PresenceStatus};
use utalk_messaging::api::{HttpMessageApi, MessageApi};
use utalk_messaging::inbound::InboundReconciler;
use utalk_messaging::outbound::OutboundPipeline;
use utalk_realtime::health::ConnectionHealthMonitor;
use utalk_realtime::presence::PresenceTracker;
use utalk_realtime::session::SessionBroadcast;
use utalk_store::{ConversationStore, StoreUpdate};
use utalk_transport::client::{Credentials, Transport};
use utalk_transport::frames::{ClientFrame, ServerFrame};
use utalk_transport::status::ConnectionState;
use utalk_transport::ws::WsTransport;

/// A running client session.
///
/// Owns the event routing loop and the teardown handler; everything else is
/// reachable through the accessors.
pub struct UtalkClient {
    store: Arc<ConversationStore>,
    transport: Arc<dyn Transport>,
    presence: Arc<PresenceTracker>,
    health: Arc<ConnectionHealthMonitor>,
    pipeline: OutboundPipeline,
    reconciler: Arc<InboundReconciler>,
    session: SessionBroadcast,
    cancel: CancellationToken,
}

impl UtalkClient {
    /// Build a session over a WebSocket transport and the HTTP message API.
    pub fn over_websocket(config: AppConfig, token: impl Into<String>) -> AppResult<Self> {
        let token = token.into();
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(config.transport.clone()));
        let api: Arc<dyn MessageApi> = Arc::new(HttpMessageApi::new(&config.api, token)?);
        Ok(Self::with_parts(config, transport, api))
    }

    /// Build a session from explicit collaborators.
    ///
    /// This is the seam used by tests and by embedders that bring their own
    /// transport.
    pub fn with_parts(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        api: Arc<dyn MessageApi>,
    ) -> Self {
        // ── Step 1: shared state ─────────────────────────────────
        let store = Arc::new(ConversationStore::new(config.transport.channel_buffer_size));
        let presence = Arc::new(PresenceTracker::new(config.realtime.typing_ttl()));
        let session = SessionBroadcast::default();

        // ── Step 2: delivery path ────────────────────────────────
        let pipeline = OutboundPipeline::new(
            Arc::clone(&transport),
            Arc::clone(&api),
            Arc::clone(&store),
        );
        let reconciler = Arc::new(InboundReconciler::new(
            Arc::clone(&transport),
            Arc::clone(&store),
        ));

        // ── Step 3: health observation ───────────────────────────
        let health = Arc::new(ConnectionHealthMonitor::new(
            Arc::clone(&transport),
            config.realtime.health_poll_interval(),
        ));

        let client = Self {
            store,
            transport,
            presence,
            health,
            pipeline,
            reconciler,
            session,
            cancel: CancellationToken::new(),
        };

        // ── Step 4: background routing ───────────────────────────
        client.spawn_event_loop();
        client.spawn_teardown_handler();
        client
    }

    /// Connect the transport and authenticate.
    pub async fn connect(&self, credentials: Credentials) -> AppResult<()> {
        match self.transport.connect(credentials).await {
            Ok(()) => {
                info!("Session connected");
                Ok(())
            }
            Err(e) if e.kind == ErrorKind::Authentication => {
                self.session.invalidate(SessionEndReason::Unauthorized);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // ── Messaging ────────────────────────────────────────────────

    /// Send a message through the dual-path pipeline.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) -> AppResult<Message> {
        match self
            .pipeline
            .send(conversation_id, content, kind, attachments)
            .await
        {
            Err(e) if e.kind == ErrorKind::Authentication => {
                self.session.invalidate(SessionEndReason::Unauthorized);
                Err(e)
            }
            other => other,
        }
    }

    /// Retry a failed message, bounded by the retry budget.
    pub async fn retry_message(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
    ) -> AppResult<Message> {
        match self.pipeline.retry(conversation_id, client_ref).await {
            Err(e) if e.kind == ErrorKind::Authentication => {
                self.session.invalidate(SessionEndReason::Unauthorized);
                Err(e)
            }
            other => other,
        }
    }

    /// Open a conversation: reset its unread count immediately, then move
    /// the live subscription over to it.
    ///
    /// The unread reset is synchronous — it is visible before this method
    /// first awaits.
    pub async fn open_conversation(&self, conversation_id: ConversationId) -> AppResult<()> {
        let previous = self.store.selected_conversation();
        self.store.select_conversation(conversation_id);

        if let Some(previous) = previous.filter(|p| *p != conversation_id) {
            if let Err(e) = self.reconciler.unsubscribe(previous).await {
                debug!(conversation_id = %previous, error = %e, "Unsubscribe failed");
            }
        }
        self.reconciler.subscribe(conversation_id).await
    }

    /// Send our own typing indicator.
    pub async fn set_typing(
        &self,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> AppResult<()> {
        self.transport
            .send(ClientFrame::Typing {
                conversation_id,
                is_typing,
            })
            .await
    }

    /// Publish our own presence status.
    pub async fn set_presence(&self, status: PresenceStatus) -> AppResult<()> {
        self.transport.send(ClientFrame::Presence { status }).await
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Snapshot of a conversation.
    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.store.conversation(id)
    }

    /// Ordered messages of a conversation.
    pub fn messages(&self, id: ConversationId) -> Vec<Message> {
        self.store.messages(id)
    }

    /// Subscribe to store change notifications.
    pub fn store_updates(&self) -> broadcast::Receiver<StoreUpdate> {
        self.store.subscribe()
    }

    /// The local store handle.
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Users currently typing in a conversation.
    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.presence.typing_users(conversation_id)
    }

    /// Whether anyone is typing in a conversation.
    pub fn is_anyone_typing(&self, conversation_id: ConversationId) -> bool {
        self.presence.is_anyone_typing(conversation_id)
    }

    /// A user's presence record.
    pub fn presence(&self, user_id: UserId) -> Option<PresenceRecord> {
        self.presence.record(user_id)
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.health.status()
    }

    /// Observe connection state changes.
    pub fn connection_watch(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.health.watch()
    }

    /// Manually re-run the transport handshake with the last-known
    /// credentials.
    pub async fn reconnect_now(&self) -> AppResult<()> {
        self.health.reconnect_now().await
    }

    /// Subscribe to session lifecycle events.
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Log out: broadcast the invalidation and let the teardown handler do
    /// the rest.
    pub fn logout(&self) {
        self.session.invalidate(SessionEndReason::Logout);
    }

    /// Stop background tasks and drop the link. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.health.shutdown();
        self.transport.disconnect().await;
    }

    fn spawn_event_loop(&self) {
        let Some(mut events) = self.transport.take_events() else {
            warn!("Transport events already consumed; routing loop not started");
            return;
        };
        let presence = Arc::clone(&self.presence);
        let reconciler = Arc::clone(&self.reconciler);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = events.recv() => match frame {
                        Some(f) => f,
                        None => break,
                    },
                };
                match &frame {
                    ServerFrame::Typing {
                        user_id,
                        conversation_id,
                        is_typing,
                    } => {
                        presence.set_typing(*user_id, *conversation_id, *is_typing);
                    }
                    ServerFrame::PresenceChanged { user_id, status } => {
                        presence.update_presence(*user_id, *status);
                    }
                    other => reconciler.handle_frame(other),
                }
            }
            debug!("Event routing loop ended");
        });
    }

    fn spawn_teardown_handler(&self) {
        let mut events = self.session.subscribe();
        let store = Arc::clone(&self.store);
        let reconciler = Arc::clone(&self.reconciler);
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(e) => e,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if let SessionEvent::Invalidated { reason } = event {
                    info!(?reason, "Tearing down session state");
                    transport.disconnect().await;
                    reconciler.clear();
                    store.clear();
                }
            }
        });
    }
}

impl Drop for UtalkClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
