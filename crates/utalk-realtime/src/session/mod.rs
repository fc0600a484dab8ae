//! Session lifecycle broadcast.

pub mod broadcast;

pub use broadcast::SessionBroadcast;
