//! Observable connection status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detailed connection status, including the reconnection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Handshake complete, link healthy.
    Connected,
    /// First connection attempt in progress.
    Connecting,
    /// Automatic reconnection in progress.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// No link, and no attempt in progress.
    Disconnected,
}

impl ConnectionStatus {
    /// Collapse to the coarse three-state view shown by simple indicators.
    ///
    /// `Reconnecting` folds into `Connecting`; the detailed variant remains
    /// available for surfaces that distinguish the two.
    pub fn coarse(&self) -> CoarseStatus {
        match self {
            Self::Connected => CoarseStatus::Connected,
            Self::Connecting | Self::Reconnecting { .. } => CoarseStatus::Connecting,
            Self::Disconnected => CoarseStatus::Disconnected,
        }
    }

    /// Whether frames can currently be written to the link.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// The coarse connected/connecting/disconnected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseStatus {
    /// Link up.
    Connected,
    /// Link being established or re-established.
    Connecting,
    /// Link down.
    Disconnected,
}

/// Full observable state of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,
    /// When the link last completed a handshake.
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Initial state before any connection attempt.
    pub fn disconnected() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected_at: None,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}
