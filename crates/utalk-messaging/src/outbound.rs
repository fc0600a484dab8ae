//! Outbound message pipeline.
//!
//! Dual-path delivery: transport emit-with-ack first, REST POST as the
//! fallback. The transport ack is the single source of truth for "did the
//! server persist this"; the fallback only runs when the transport path
//! definitively did not confirm persistence. Both paths carry the message's
//! client reference as an idempotency key, so a fallback racing a lost ack
//! cannot create a second durable record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use utalk_core::error::ErrorKind;
use utalk_core::types::{ClientRef, ConversationId};
use utalk_core::{AppError, AppResult};
use utalk_entity::message::{Attachment, Message, MessageKind};
use utalk_store::ConversationStore;
use utalk_transport::client::Transport;
use utalk_transport::frames::ClientFrame;

use crate::api::{MessageApi, NewMessage};

/// Maximum failed attempts per logical message before manual retries are
/// rejected without a network call.
pub const MAX_RETRIES: u32 = 3;

/// The outbound delivery pipeline.
pub struct OutboundPipeline {
    transport: Arc<dyn Transport>,
    api: Arc<dyn MessageApi>,
    store: Arc<ConversationStore>,
}

impl OutboundPipeline {
    /// Wire the pipeline to its collaborators.
    pub fn new(
        transport: Arc<dyn Transport>,
        api: Arc<dyn MessageApi>,
        store: Arc<ConversationStore>,
    ) -> Self {
        Self {
            transport,
            api,
            store,
        }
    }

    /// Send a message.
    ///
    /// The optimistic record is inserted synchronously before any network
    /// I/O; the returned record is terminal — `Sent` when either path
    /// confirmed persistence, `Error` when both failed. Delivery failures
    /// land on the record, never in the `Err` channel; `Err` is reserved for
    /// conditions the caller got wrong (e.g. the retry budget).
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) -> AppResult<Message> {
        let message = Message::outgoing(conversation_id, content, kind, attachments);
        self.store.insert_optimistic(message.clone());
        self.attempt(message).await
    }

    /// Retry a failed message by its original client reference.
    ///
    /// The retry budget is enforced before any network call and spans all
    /// pipeline invocations for the same logical message.
    pub async fn retry(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
    ) -> AppResult<Message> {
        let record = self
            .store
            .message_by_client_ref(conversation_id, client_ref)
            .ok_or_else(|| AppError::not_found(format!("No message for ref {client_ref}")))?;

        // retry_count counts every failed delivery, the initial send
        // included, so the budget of MAX_RETRIES manual retries is spent
        // once the counter passes it.
        if record.retry_count > MAX_RETRIES {
            return Err(AppError::retry_limit(format!(
                "Retry limit reached after {MAX_RETRIES} retries"
            )));
        }

        let message = self
            .store
            .begin_retry(conversation_id, client_ref)
            .ok_or_else(|| {
                AppError::validation(format!("Message {client_ref} is not in an error state"))
            })?;

        self.attempt(message).await
    }

    /// Run the dual-path send for an already-inserted record.
    async fn attempt(&self, message: Message) -> AppResult<Message> {
        let conversation_id = message.conversation_id;
        let client_ref = message.client_ref.clone();

        let frame = ClientFrame::SendMessage {
            client_ref: client_ref.clone(),
            conversation_id,
            content: message.content.clone(),
            kind: message.kind,
            attachments: message.attachments.clone(),
        };

        match self.transport.emit(frame).await {
            Ok(ack) if ack.success => match ack.message_id {
                Some(server_id) => {
                    let timestamp = ack.timestamp.unwrap_or_else(Utc::now);
                    self.store
                        .reconcile(conversation_id, &client_ref, server_id, timestamp);
                    debug!(%client_ref, %server_id, "Delivered via transport");
                    return self.current_record(conversation_id, &client_ref);
                }
                None => {
                    // A success ack without an id confirms nothing; treat it
                    // as a rejection and fall back.
                    warn!(%client_ref, "Ack succeeded without a message id");
                }
            },
            Ok(ack) => {
                // Explicit rejection implies the server persisted nothing;
                // the fallback cannot duplicate.
                debug!(
                    %client_ref,
                    error = ack.error.as_deref().unwrap_or("unspecified"),
                    "Transport rejected send; falling back to REST"
                );
            }
            Err(e) if matches!(e.kind, ErrorKind::AckTimeout | ErrorKind::Network) => {
                // Timeout or no link: persistence is unconfirmed either way.
                // The client reference travels with the POST as an
                // idempotency key, which makes this path safe.
                debug!(%client_ref, error = %e, "Transport path unavailable; falling back to REST");
            }
            Err(e) => {
                warn!(%client_ref, error = %e, "Transport emit failed; falling back to REST");
            }
        }

        self.fallback(conversation_id, &message).await
    }

    /// REST fallback for a send whose transport path did not confirm.
    async fn fallback(
        &self,
        conversation_id: ConversationId,
        message: &Message,
    ) -> AppResult<Message> {
        let client_ref = message.client_ref.clone();
        let body = NewMessage {
            content: message.content.clone(),
            kind: message.kind,
            attachments: message.attachments.clone(),
            client_ref: client_ref.clone(),
        };

        match self.api.create_message(conversation_id, &body).await {
            Ok(resource) => {
                self.store
                    .reconcile(conversation_id, &client_ref, resource.id, resource.timestamp);
                debug!(%client_ref, server_id = %resource.id, "Delivered via REST fallback");
                self.current_record(conversation_id, &client_ref)
            }
            Err(e) => {
                let retries = self
                    .store
                    .mark_error(conversation_id, &client_ref, &e.message);
                warn!(
                    %client_ref,
                    error = %e,
                    retry_count = retries.unwrap_or_default(),
                    "Both send paths failed"
                );
                if e.kind == ErrorKind::Authentication {
                    // Surface the session problem to the caller on top of
                    // the error record; teardown is the facade's call.
                    return Err(e);
                }
                self.current_record(conversation_id, &client_ref)
            }
        }
    }

    /// Re-read the record as it stands now. Mutations since the caller's
    /// snapshot (a racing inbound event, a late ack) must win.
    fn current_record(
        &self,
        conversation_id: ConversationId,
        client_ref: &ClientRef,
    ) -> AppResult<Message> {
        self.store
            .message_by_client_ref(conversation_id, client_ref)
            .ok_or_else(|| {
                AppError::internal(format!("Record for {client_ref} vanished from the store"))
            })
    }
}
