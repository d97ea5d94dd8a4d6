//! Shared types used by both the client and the server.

pub mod conversation;
pub mod error;
pub mod event;
pub mod message;

pub use conversation::{Conversation, ConversationStatus, Feedback};
pub use error::SharedError;
pub use event::{ClientEvent, ServerEvent};
pub use message::{Message, MessageKind, MessageMetadata, Sender};
