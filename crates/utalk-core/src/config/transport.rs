//! Transport (WebSocket) configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the persistent bidirectional transport connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// WebSocket endpoint URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Connect + handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Acknowledgement timeout for emit-with-ack, in seconds.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_seconds: u64,
    /// Maximum automatic reconnection attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff, in milliseconds.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on the reconnection backoff delay, in milliseconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Buffer size of the inbound event channel.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl TransportConfig {
    /// Ack timeout as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_seconds)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_seconds: default_connect_timeout(),
            ack_timeout_seconds: default_ack_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:3001/ws".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_ack_timeout() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay() -> u64 {
    500
}

fn default_reconnect_max_delay() -> u64 {
    10_000
}

fn default_channel_buffer() -> usize {
    256
}
