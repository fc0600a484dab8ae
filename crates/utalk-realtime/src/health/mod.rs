//! Connection health observation.

pub mod monitor;

pub use monitor::ConnectionHealthMonitor;
