/**
 * In-memory Conversation Store
 *
 * Process-lifetime store used by the default server wiring and by tests.
 * State is a map of conversation id to conversation behind a tokio
 * `RwLock`; handlers only hold the lock for short, non-blocking sections.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::shared::conversation::{Conversation, ConversationStatus, Feedback};
use crate::shared::message::Message;

use super::{ConversationStore, StoreError};

/// In-memory implementation of [`ConversationStore`]
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id, conversation.clone());
        tracing::debug!("[Store] Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn list_conversations(&self, owner: Uuid) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut listed: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.owner == owner)
            .map(|c| {
                let mut summary = c.clone();
                summary.messages.clear();
                summary
            })
            .collect();
        listed.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(listed)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        message: Message,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&conversation_id)
            .ok_or(StoreError::not_found(conversation_id))?;
        conversation.append_message(message);
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        let conversation = conversations
            .get(&conversation_id)
            .ok_or(StoreError::not_found(conversation_id))?;
        Ok(conversation.recent_messages(limit))
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        title: Option<String>,
        status: Option<ConversationStatus>,
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(StoreError::not_found(id))?;
        if let Some(title) = title {
            conversation
                .set_title(title)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        if let Some(status) = status {
            conversation.status = status;
        }
        Ok(conversation.clone())
    }

    async fn set_feedback(&self, id: Uuid, feedback: Feedback) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(StoreError::not_found(id))?;
        conversation.feedback = Some(feedback);
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.conversations.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let conversation = Conversation::new(Uuid::new_v4(), "Hello");
        let id = conversation.id;
        store.create_conversation(conversation).await.unwrap();
        let fetched = store.get_conversation(id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let store = MemoryStore::new();
        let conversation = Conversation::new(Uuid::new_v4(), "Hello");
        let id = conversation.id;
        store.create_conversation(conversation).await.unwrap();

        for i in 0..3 {
            store
                .append_message(id, Message::new_user(id, format!("msg {}", i)))
                .await
                .unwrap();
        }

        let fetched = store.get_conversation(id).await.unwrap().unwrap();
        let contents: Vec<_> = fetched.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2"]);
    }

    #[tokio::test]
    async fn test_append_to_missing_conversation() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let result = store.append_message(id, Message::new_user(id, "hi")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_excludes_other_owners() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store
            .create_conversation(Conversation::new(owner, "Mine"))
            .await
            .unwrap();
        store
            .create_conversation(Conversation::new(Uuid::new_v4(), "Theirs"))
            .await
            .unwrap();

        let listed = store.list_conversations(owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Mine");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let conversation = Conversation::new(Uuid::new_v4(), "Hello");
        let id = conversation.id;
        store.create_conversation(conversation).await.unwrap();
        assert!(store.delete_conversation(id).await.unwrap());
        assert!(!store.delete_conversation(id).await.unwrap());
    }
}
