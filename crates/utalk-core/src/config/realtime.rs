//! Presence, typing, and connection-health configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for presence tracking and the connection health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Seconds after the last typing event before an indicator expires.
    #[serde(default = "default_typing_ttl")]
    pub typing_ttl_seconds: u64,
    /// Poll interval of the connection health monitor, in seconds.
    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_seconds: u64,
}

impl RealtimeConfig {
    /// Typing TTL as a [`Duration`].
    pub fn typing_ttl(&self) -> Duration {
        Duration::from_secs(self.typing_ttl_seconds)
    }

    /// Health poll interval as a [`Duration`].
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            typing_ttl_seconds: default_typing_ttl(),
            health_poll_interval_seconds: default_health_poll_interval(),
        }
    }
}

fn default_typing_ttl() -> u64 {
    3
}

fn default_health_poll_interval() -> u64 {
    2
}
