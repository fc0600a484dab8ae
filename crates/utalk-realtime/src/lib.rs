//! # utalk-realtime
//!
//! Side-channel state for the UTalk client, driven entirely by transport
//! events:
//!
//! - per-user presence and per-conversation typing indicators with TTL expiry
//! - the connection health monitor with a manual reconnect affordance
//! - the session invalidation broadcast consumed by teardown handlers

pub mod health;
pub mod presence;
pub mod session;

pub use health::ConnectionHealthMonitor;
pub use presence::PresenceTracker;
pub use session::SessionBroadcast;
