//! WebSocket implementation of the [`Transport`] contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use utalk_core::config::transport::TransportConfig;
use utalk_core::{AppError, AppResult};

use crate::backoff::Backoff;
use crate::client::{Credentials, Transport};
use crate::frames::{AckResponse, ClientFrame, ServerFrame};
use crate::status::{ConnectionState, ConnectionStatus};

/// WebSocket transport client.
///
/// One logical connection at a time; a generation counter invalidates the
/// read loop of a replaced link so a stale task can never trigger a second
/// reconnection pass.
pub struct WsTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: TransportConfig,
    backoff: Backoff,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<ServerFrame>,
    events_rx: Mutex<Option<mpsc::Receiver<ServerFrame>>>,
    /// Ack correlation table: ack key → waiting sender.
    pending_acks: DashMap<String, oneshot::Sender<AckResponse>>,
    /// Writer channel of the current link, if connected.
    outbound: Mutex<Option<mpsc::Sender<ClientFrame>>>,
    credentials: Mutex<Option<Credentials>>,
    generation: AtomicU64,
    shutdown: AtomicBool,
}

impl WsTransport {
    /// Create a transport from configuration. No connection is made yet.
    pub fn new(config: TransportConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::disconnected());
        let (events_tx, events_rx) = mpsc::channel(config.channel_buffer_size);
        let backoff = Backoff::new(
            std::time::Duration::from_millis(config.reconnect_base_delay_ms),
            std::time::Duration::from_millis(config.reconnect_max_delay_ms),
            config.max_reconnect_attempts,
        );
        Self {
            inner: Arc::new(Inner {
                config,
                backoff,
                state_tx,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                pending_acks: DashMap::new(),
                outbound: Mutex::new(None),
                credentials: Mutex::new(None),
                generation: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, credentials: Credentials) -> AppResult<()> {
        {
            let mut creds = self.inner.lock_credentials();
            *creds = Some(credentials.clone());
        }
        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.inner.set_status(ConnectionStatus::Connecting);

        match self.inner.clone().establish(&credentials).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn reconnect(&self) -> AppResult<()> {
        let credentials = self
            .inner
            .lock_credentials()
            .clone()
            .ok_or_else(|| AppError::session("No credentials; connect() has never run"))?;
        self.connect(credentials).await
    }

    async fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.drop_link();
        self.inner.set_status(ConnectionStatus::Disconnected);
        info!("Transport disconnected");
    }

    async fn emit(&self, frame: ClientFrame) -> AppResult<AckResponse> {
        let key = frame
            .ack_key()
            .ok_or_else(|| AppError::validation("Frame is not ack-correlated"))?;

        let outbound = self
            .inner
            .current_outbound()
            .ok_or_else(|| AppError::network("Transport not connected"))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending_acks.insert(key.clone(), tx);

        if outbound.send(frame).await.is_err() {
            self.inner.pending_acks.remove(&key);
            return Err(AppError::network("Transport link closed during emit"));
        }

        match timeout(self.inner.config.ack_timeout(), rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => {
                // Correlation entry dropped: the link was torn down.
                Err(AppError::network("Transport link closed awaiting ack"))
            }
            Err(_) => {
                self.inner.pending_acks.remove(&key);
                Err(AppError::ack_timeout(format!(
                    "No ack within {}s",
                    self.inner.config.ack_timeout_seconds
                )))
            }
        }
    }

    async fn send(&self, frame: ClientFrame) -> AppResult<()> {
        let outbound = self
            .inner
            .current_outbound()
            .ok_or_else(|| AppError::network("Transport not connected"))?;
        outbound
            .send(frame)
            .await
            .map_err(|_| AppError::network("Transport link closed during send"))
    }

    fn take_events(&self) -> Option<mpsc::Receiver<ServerFrame>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }
}

impl Inner {
    fn lock_credentials(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_outbound(&self) -> Option<mpsc::Sender<ClientFrame>> {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.state_tx.send_modify(|state| {
            state.status = status;
            if status == ConnectionStatus::Connected {
                state.last_connected_at = Some(Utc::now());
            }
        });
    }

    /// Drop the writer channel so the writer task closes the sink, and fail
    /// every ack wait tied to the old link.
    fn drop_link(&self) {
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.pending_acks.clear();
    }

    /// Open the socket, run the handshake, and install the link.
    ///
    /// Returns an explicitly boxed future (rather than `async fn`) because
    /// `establish` is mutually recursive with `link_down`, and rustc cannot
    /// compute auto-trait (`Send`) leakage for a self-referential opaque
    /// `impl Future` type.
    fn establish<'a>(
        self: Arc<Self>,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = AppResult<()>> + Send + 'a>> {
        Box::pin(async move {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let connect = tokio_tungstenite::connect_async(&self.config.url);
        let (ws, _) = timeout(self.config.connect_timeout(), connect)
            .await
            .map_err(|_| {
                AppError::network(format!(
                    "Connect timed out after {}s",
                    self.config.connect_timeout_seconds
                ))
            })?
            .map_err(|e| AppError::network(format!("WebSocket connect failed: {e}")))?;

        let (mut sink, mut stream) = ws.split();

        // Handshake: hello out, hello_ok (or auth_error) back, all within
        // the connect timeout.
        let hello = ClientFrame::Hello {
            token: credentials.token.clone(),
            email: credentials.email.clone(),
        };
        let payload = serde_json::to_string(&hello)?;
        sink.send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| AppError::network(format!("Handshake write failed: {e}")))?;

        let first = timeout(self.config.connect_timeout(), stream.next())
            .await
            .map_err(|_| AppError::network("Handshake timed out"))?
            .ok_or_else(|| AppError::network("Link closed during handshake"))?
            .map_err(|e| AppError::network(format!("Handshake read failed: {e}")))?;

        match parse_frame(&first) {
            Some(ServerFrame::HelloOk { user_id }) => {
                debug!(%user_id, "Handshake accepted");
            }
            Some(ServerFrame::AuthError { message }) => {
                return Err(AppError::authentication(message));
            }
            other => {
                return Err(AppError::network(format!(
                    "Unexpected handshake response: {other:?}"
                )));
            }
        }

        // Writer task: drains typed frames into the sink.
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(self.config.channel_buffer_size);
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let payload = match serde_json::to_string(&frame) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(payload.into())).await {
                    debug!(error = %e, "Writer stopped: link closed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(outbound_tx);
        self.set_status(ConnectionStatus::Connected);
        info!(url = %self.config.url, "Transport connected");

        // Read task for this link generation.
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let mut server_bye = false;
            while let Some(item) = stream.next().await {
                let msg = match item {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(error = %e, "Read loop error");
                        break;
                    }
                };
                if matches!(msg, WsMessage::Close(_)) {
                    break;
                }
                let Some(frame) = parse_frame(&msg) else {
                    continue;
                };
                if inner.route(frame).await.is_break() {
                    server_bye = true;
                    break;
                }
            }
            inner.link_down(generation, server_bye).await;
        });

        Ok(())
        })
    }

    /// Dispatch one inbound frame. `Break` means the server asked us to
    /// drop the link and reconnect.
    async fn route(&self, frame: ServerFrame) -> std::ops::ControlFlow<()> {
        match frame {
            ServerFrame::Ack {
                client_ref,
                success,
                message_id,
                timestamp,
                error,
            } => {
                let key = client_ref.to_string();
                if let Some((_, waiter)) = self.pending_acks.remove(&key) {
                    let _ = waiter.send(AckResponse {
                        success,
                        message_id,
                        timestamp,
                        error,
                    });
                } else {
                    // Abandoned wait: the pipeline already moved on.
                    debug!(client_ref = %key, "Dropping late ack");
                }
            }
            ServerFrame::Ping { timestamp } => {
                if let Some(outbound) = self.current_outbound() {
                    let _ = outbound.send(ClientFrame::Pong { timestamp }).await;
                }
            }
            ServerFrame::Bye { reason } => {
                info!(%reason, "Server closed the session; reconnecting proactively");
                return std::ops::ControlFlow::Break(());
            }
            ServerFrame::HelloOk { .. } | ServerFrame::AuthError { .. } => {
                debug!("Ignoring handshake frame outside handshake");
            }
            other => {
                if self.events_tx.send(other).await.is_err() {
                    debug!("Event consumer gone; dropping inbound frame");
                }
            }
        }
        std::ops::ControlFlow::Continue(())
    }

    /// Handle loss of the link for the given generation.
    async fn link_down(self: &Arc<Self>, generation: u64, _server_initiated: bool) {
        if self.generation.load(Ordering::SeqCst) != generation {
            // A newer link replaced this one already.
            return;
        }
        self.drop_link();

        if self.shutdown.load(Ordering::SeqCst) {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }

        let credentials = match self.lock_credentials().clone() {
            Some(c) => c,
            None => {
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
        };

        warn!("Transport link lost; starting automatic reconnection");
        let mut attempt = 1u32;
        while self.backoff.allows(attempt) {
            self.set_status(ConnectionStatus::Reconnecting { attempt });
            tokio::time::sleep(self.backoff.delay(attempt)).await;

            if self.shutdown.load(Ordering::SeqCst) {
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
            if self.current_outbound().is_some() {
                // A manual connect won the race while we slept.
                return;
            }

            // Boxed to break the establish → read task → link_down cycle in
            // the future's type.
            let inner = Arc::clone(self);
            let creds = credentials.clone();
            let attempt_fut: std::pin::Pin<
                Box<dyn std::future::Future<Output = AppResult<()>> + Send>,
            > = Box::pin(async move { inner.establish(&creds).await });
            match attempt_fut.await {
                Ok(()) => {
                    info!(attempt, "Reconnected");
                    return;
                }
                Err(e) if e.kind == utalk_core::error::ErrorKind::Authentication => {
                    // Stale credentials are never silently retried.
                    warn!(error = %e, "Reconnect rejected as unauthenticated; giving up");
                    self.set_status(ConnectionStatus::Disconnected);
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
            attempt += 1;
        }

        // Exhaustion is reported, never fatal: manual reconnect stays
        // available through the health monitor.
        warn!(
            attempts = self.backoff.max_attempts(),
            "Reconnection budget exhausted"
        );
        self.set_status(ConnectionStatus::Disconnected);
    }
}

fn parse_frame(msg: &WsMessage) -> Option<ServerFrame> {
    let text = match msg {
        WsMessage::Text(t) => t.as_str(),
        _ => return None,
    };
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Skipping malformed inbound frame");
            None
        }
    }
}
