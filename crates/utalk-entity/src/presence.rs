//! Presence entity and status definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use utalk_core::types::{ConversationId, UserId};

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// User is connected and active.
    Online,
    /// User is connected but marked away.
    Away,
    /// Do not disturb.
    Busy,
    /// User is not connected.
    Offline,
}

impl PresenceStatus {
    /// Parses from a string with a default fallback.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "online" => Self::Online,
            "away" => Self::Away,
            "busy" | "dnd" => Self::Busy,
            "offline" => Self::Offline,
            _ => Self::Offline,
        }
    }

    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

/// Presence state for a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// The user this record describes.
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceStatus,
    /// The conversation the user is typing in, if any.
    ///
    /// A user types in at most one conversation at a time; this field is the
    /// authority for that invariant.
    pub typing_in: Option<ConversationId>,
    /// When the user was last seen.
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceRecord {
    /// Create a record with the given status and no typing state.
    pub fn new(user_id: UserId, status: PresenceStatus) -> Self {
        Self {
            user_id,
            status,
            typing_in: None,
            last_seen_at: Utc::now(),
        }
    }
}
