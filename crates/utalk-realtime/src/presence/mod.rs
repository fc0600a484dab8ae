//! Presence and typing state.

pub mod tracker;

pub use tracker::PresenceTracker;
