//! # utalk-transport
//!
//! The transport client for UTalk. Wraps a persistent bidirectional
//! WebSocket connection to the messaging backend and owns:
//!
//! - the authenticated handshake (token + user email)
//! - typed frame emit, with ack correlation and a bounded wait
//! - reconnection with capped exponential backoff
//! - the observable connection status feed

pub mod backoff;
pub mod client;
pub mod frames;
pub mod status;
pub mod ws;

pub use client::{Credentials, Transport};
pub use frames::{AckResponse, ClientFrame, ServerFrame};
pub use status::{ConnectionState, ConnectionStatus};
pub use ws::WsTransport;
