//! Session lifecycle events.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// The user logged out locally.
    Logout,
    /// A REST request or transport handshake was rejected as unauthenticated.
    Unauthorized,
    /// The server closed the session from its side.
    ServerInitiated,
}

/// Events related to the client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The session was established and the transport is authenticated.
    Established {
        /// The authenticated user.
        user_id: UserId,
    },
    /// The session is no longer valid; all consumers must tear down.
    Invalidated {
        /// Why the session ended.
        reason: SessionEndReason,
    },
}
