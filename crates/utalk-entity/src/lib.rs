//! # utalk-entity
//!
//! Domain entities for the UTalk realtime client: messages with their
//! optimistic-send lifecycle, conversations, and presence records.

pub mod conversation;
pub mod message;
pub mod presence;

pub use conversation::{Conversation, ConversationStatus};
pub use message::{LocalMessageId, Message, MessageKind, MessageStatus, Sender};
pub use presence::{PresenceRecord, PresenceStatus};
