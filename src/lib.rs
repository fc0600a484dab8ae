//! # utalk-client
//!
//! Session facade for the UTalk realtime messaging client. Wires the store,
//! transport, presence tracker, health monitor, and message pipeline
//! together and routes inbound transport events to their consumers.

pub mod client;
pub mod logging;

pub use client::UtalkClient;

pub use utalk_core::config::AppConfig;
pub use utalk_core::{AppError, AppResult};
pub use utalk_entity::message::{Message, MessageKind, MessageStatus};
pub use utalk_transport::client::Credentials;
pub use utalk_transport::status::{ConnectionState, ConnectionStatus};
