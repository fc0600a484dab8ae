//! Shared test doubles: a scripted transport and a scripted message API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};

use utalk_client::{AppConfig, UtalkClient};
use utalk_core::types::{ConversationId, MessageId};
use utalk_core::{AppError, AppResult};
use utalk_entity::message::{Message, Sender};
use utalk_messaging::api::{MessageApi, MessageResource, NewMessage};
use utalk_transport::client::{Credentials, Transport};
use utalk_transport::frames::{AckResponse, ClientFrame, ServerFrame};
use utalk_transport::status::{ConnectionState, ConnectionStatus};

/// How the mock transport answers the next emit-with-ack.
#[derive(Debug, Clone)]
pub enum AckScript {
    /// Ack success with the given durable id.
    OkWithId(MessageId),
    /// Ack with `success: false`.
    Reject(&'static str),
    /// No ack within the 5s deadline.
    Timeout,
}

/// Scripted in-process transport.
pub struct MockTransport {
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<ServerFrame>,
    events_rx: Mutex<Option<mpsc::Receiver<ServerFrame>>>,
    scripts: Mutex<VecDeque<AckScript>>,
    /// Frames that went through emit-with-ack.
    pub emitted: Mutex<Vec<ClientFrame>>,
    /// Frames that went through fire-and-forget send.
    pub sent: Mutex<Vec<ClientFrame>>,
    connected: AtomicBool,
    /// When set, `connect` fails the handshake as unauthenticated.
    pub reject_handshake: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::disconnected());
        let (events_tx, events_rx) = mpsc::channel(64);
        Arc::new(Self {
            state_tx,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            scripts: Mutex::new(VecDeque::new()),
            emitted: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            reject_handshake: AtomicBool::new(false),
        })
    }

    pub fn script(&self, script: AckScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub async fn inject(&self, frame: ServerFrame) {
        self.events_tx.send(frame).await.expect("event consumer");
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.state_tx.send_modify(|state| {
            state.status = if connected {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            };
            if connected {
                state.last_connected_at = Some(Utc::now());
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _credentials: Credentials) -> AppResult<()> {
        if self.reject_handshake.load(Ordering::SeqCst) {
            return Err(AppError::authentication("Handshake rejected"));
        }
        self.set_connected(true);
        Ok(())
    }

    async fn reconnect(&self) -> AppResult<()> {
        if self.reject_handshake.load(Ordering::SeqCst) {
            return Err(AppError::authentication("Handshake rejected"));
        }
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) {
        self.set_connected(false);
    }

    async fn emit(&self, frame: ClientFrame) -> AppResult<AckResponse> {
        if !self.is_connected() {
            return Err(AppError::network("Transport not connected"));
        }
        self.emitted.lock().unwrap().push(frame);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AckScript::OkWithId(MessageId::new()));
        match script {
            AckScript::OkWithId(id) => Ok(AckResponse {
                success: true,
                message_id: Some(id),
                timestamp: Some(Utc::now()),
                error: None,
            }),
            AckScript::Reject(reason) => Ok(AckResponse {
                success: false,
                message_id: None,
                timestamp: None,
                error: Some(reason.to_string()),
            }),
            AckScript::Timeout => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(AppError::ack_timeout("No ack within 5s"))
            }
        }
    }

    async fn send(&self, frame: ClientFrame) -> AppResult<()> {
        if !self.is_connected() {
            return Err(AppError::network("Transport not connected"));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<ServerFrame>> {
        self.events_rx.lock().unwrap().take()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

/// How the mock API answers the next POST.
pub enum ApiScript {
    /// Created, echoing the idempotency key, with the given id.
    OkWithId(MessageId),
    /// Any error from the REST boundary.
    Fail(AppError),
}

/// Scripted in-process message API.
pub struct MockApi {
    scripts: Mutex<VecDeque<ApiScript>>,
    pub calls: Mutex<Vec<(ConversationId, NewMessage)>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, script: ApiScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageApi for MockApi {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        message: &NewMessage,
    ) -> AppResult<MessageResource> {
        self.calls
            .lock()
            .unwrap()
            .push((conversation_id, message.clone()));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApiScript::OkWithId(MessageId::new()));
        match script {
            ApiScript::OkWithId(id) => Ok(MessageResource {
                id,
                conversation_id,
                content: message.content.clone(),
                sender: Sender::Agent,
                kind: message.kind,
                timestamp: Utc::now(),
                client_ref: Some(message.client_ref.clone()),
            }),
            ApiScript::Fail(e) => Err(e),
        }
    }
}

/// Build a session over the mocks.
pub fn test_client() -> (UtalkClient, Arc<MockTransport>, Arc<MockApi>) {
    let transport = MockTransport::new();
    let api = MockApi::new();
    let client = UtalkClient::with_parts(
        AppConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&api) as Arc<dyn MessageApi>,
    );
    (client, transport, api)
}

pub fn credentials() -> Credentials {
    Credentials {
        token: "tok-test".into(),
        email: "agent@example.com".into(),
    }
}

/// A server-confirmed customer message, as it appears on the wire.
pub fn customer_message(
    conversation_id: ConversationId,
    content: &str,
    ts_offset_secs: i64,
) -> Message {
    let mut message = Message::outgoing(
        conversation_id,
        content,
        utalk_entity::message::MessageKind::Text,
        vec![],
    );
    message.sender = Sender::Customer;
    message.confirm(
        MessageId::new(),
        Utc::now() + chrono::Duration::seconds(ts_offset_secs),
    );
    message
}

/// Let spawned routing tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
