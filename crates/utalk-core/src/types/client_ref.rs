//! Client-generated temporary message references.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A locally-generated temporary reference for an outbound message.
///
/// The reference identifies a logical message before the server has assigned
/// a durable [`MessageId`](crate::types::MessageId). It travels with every
/// send attempt — transport emit and REST fallback alike — as an idempotency
/// key, so the server can collapse duplicate deliveries of the same logical
/// message into one durable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRef(String);

impl ClientRef {
    /// Generate a fresh reference of the form `temp_<millis>_<rand>`.
    pub fn generate() -> Self {
        Self(format!(
            "temp_{}_{:08x}",
            Utc::now().timestamp_millis(),
            rand::random::<u32>()
        ))
    }

    /// Wrap an existing reference string (e.g. echoed back by the server).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
