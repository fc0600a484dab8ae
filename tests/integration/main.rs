//! Workspace integration tests for the UTalk client session.

mod helpers;
mod pipeline;
mod realtime;
mod session;
