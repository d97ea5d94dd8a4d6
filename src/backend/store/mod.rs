/**
 * Persistence Seam
 *
 * The document store holding conversations is an external collaborator.
 * The server consumes it through the `ConversationStore` trait; the live
 * chat path only ever needs create/read/append plus a bounded history
 * fetch. The in-memory implementation in `memory` backs the server by
 * default and all tests.
 */

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::shared::conversation::{Conversation, ConversationStatus, Feedback};
use crate::shared::message::Message;

pub mod memory;

pub use memory::MemoryStore;

/// Persistence failures surfaced by a store implementation
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The conversation does not exist
    #[error("Conversation {id} not found")]
    NotFound { id: Uuid },

    /// Backend-specific failure (connection loss, corrupt document, ...)
    #[error("Store error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// CRUD interface over the conversation document store.
///
/// Message append order is insertion order; implementations must not
/// reorder by timestamp.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation
    async fn create_conversation(&self, conversation: Conversation)
        -> Result<Conversation, StoreError>;

    /// Fetch one conversation with its messages
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// List conversations for an owner, most recently active first,
    /// without message bodies
    async fn list_conversations(&self, owner: Uuid) -> Result<Vec<Conversation>, StoreError>;

    /// Append a message to a conversation, updating its activity stamp
    async fn append_message(&self, conversation_id: Uuid, message: Message)
        -> Result<(), StoreError>;

    /// The most recent `limit` messages of a conversation, oldest first
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Update title and/or status
    async fn update_conversation(
        &self,
        id: Uuid,
        title: Option<String>,
        status: Option<ConversationStatus>,
    ) -> Result<Conversation, StoreError>;

    /// Record owner feedback
    async fn set_feedback(&self, id: Uuid, feedback: Feedback) -> Result<(), StoreError>;

    /// Delete a conversation; returns whether it existed
    async fn delete_conversation(&self, id: Uuid) -> Result<bool, StoreError>;
}
