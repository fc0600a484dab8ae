//! Transport contract and credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use utalk_core::AppResult;

use crate::frames::{AckResponse, ClientFrame, ServerFrame};
use crate::status::ConnectionState;

/// Credentials attached to the transport handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token obtained at login.
    pub token: String,
    /// User identifier.
    pub email: String,
}

/// A persistent bidirectional connection to the messaging backend.
///
/// Implementations own the reconnection policy and the ack correlation; the
/// rest of the client only sees typed frames and the status feed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the link and run the authenticated handshake.
    ///
    /// A rejected handshake surfaces `ErrorKind::Authentication`, distinct
    /// from `ErrorKind::Network`, and is never retried automatically with
    /// the same credentials.
    async fn connect(&self, credentials: Credentials) -> AppResult<()>;

    /// Re-run `connect` from scratch with the last-known credentials.
    ///
    /// Available at any time, including after the automatic reconnection
    /// budget is exhausted.
    async fn reconnect(&self) -> AppResult<()>;

    /// Tear the link down deliberately. No automatic reconnection follows.
    async fn disconnect(&self);

    /// Emit a frame and wait for its acknowledgement, bounded by the
    /// configured ack timeout.
    ///
    /// The frame must be ack-correlated (see [`ClientFrame::ack_key`]).
    /// Timing out abandons the wait but not the write: a late ack for an
    /// abandoned wait is dropped by the correlation table.
    async fn emit(&self, frame: ClientFrame) -> AppResult<AckResponse>;

    /// Fire-and-forget a frame.
    async fn send(&self, frame: ClientFrame) -> AppResult<()>;

    /// Take the inbound event stream. Yields `None` after the first call;
    /// there is exactly one consumer.
    fn take_events(&self) -> Option<mpsc::Receiver<ServerFrame>>;

    /// Observe the connection state.
    fn state(&self) -> watch::Receiver<ConnectionState>;
}
