//! # utalk-messaging
//!
//! The message delivery path of the UTalk client:
//!
//! - the outbound pipeline: optimistic insert, transport emit-with-ack,
//!   REST fallback, idempotent finalization, and the bounded retry budget
//! - inbound stream reconciliation: snapshot and event merging into the
//!   local store without duplicating optimistic records
//! - the REST API boundary used by the fallback path

pub mod api;
pub mod inbound;
pub mod outbound;

pub use api::{HttpMessageApi, MessageApi, MessageResource, NewMessage};
pub use inbound::InboundReconciler;
pub use outbound::OutboundPipeline;
