/**
 * Conversation Message Router
 *
 * Handles one inbound user message end to end:
 *
 * received -> persisted(user) -> awaiting_completion -> persisted(reply) -> emitted
 * received -> persisted(user) -> completion_failed -> fallback_reply_persisted -> emitted
 *
 * The router is transport-agnostic: the socket dispatcher and the
 * `POST /api/messages` fallback handler both call `handle_new_message`
 * with an already-authenticated identity. Events are emitted to the
 * identity's sessions and the conversation room either way; the fallback
 * caller additionally gets the outcome back as its response body.
 *
 * Once a user message has been accepted, the conversation is never left
 * without a reply: any provider failure is converted into the fixed
 * fallback reply with `metadata.error` set.
 */

use std::sync::Arc;

use axum::http::StatusCode;
use uuid::Uuid;

use crate::backend::completion::CompletionProvider;
use crate::backend::error::BackendError;
use crate::backend::socket::SessionRegistry;
use crate::backend::store::ConversationStore;
use crate::shared::conversation::Conversation;
use crate::shared::event::ServerEvent;
use crate::shared::message::{validate_content, Message, MessageMetadata};

/// Reply persisted when the completion provider fails
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble generating a reply right now. \
     A support agent will follow up with you as soon as possible.";

/// Outcome of one routed message, returned to the fallback caller
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub conversation: Conversation,
    pub user_message: Message,
    pub bot_message: Message,
}

/// Routes inbound messages through persistence and the completion provider
pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<SessionRegistry>,
    /// How many recent messages accompany the provider call
    history_window: usize,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<SessionRegistry>,
        history_window: usize,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            history_window,
        }
    }

    /// Route one user message.
    ///
    /// Locates or creates the conversation, persists the user message,
    /// emits `messageSent` and a typing signal, invokes the provider with
    /// bounded history, persists the reply (or the fallback reply) and
    /// emits `botMessage`.
    pub async fn handle_new_message(
        &self,
        identity: Uuid,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<SendOutcome, BackendError> {
        validate_content(content)?;

        let conversation = self.locate_or_create(identity, content, conversation_id).await?;
        let conversation_id = conversation.id;

        // History for the provider ends just before the new message; the
        // payload builder adds the new message as the final user turn.
        let history = self
            .store
            .recent_messages(conversation_id, self.history_window)
            .await?;

        // Persist the user message; from here on the send must not surface
        // a failure to the caller.
        let user_message = Message::new_user(conversation_id, content);
        self.store
            .append_message(conversation_id, user_message.clone())
            .await?;
        tracing::info!(
            "[Router] Persisted user message {} in conversation {}",
            user_message.id,
            conversation_id
        );

        self.registry
            .emit_to_participants(
                identity,
                conversation_id,
                ServerEvent::MessageSent {
                    message: user_message.clone(),
                },
            )
            .await;
        self.registry
            .emit_to_participants(identity, conversation_id, ServerEvent::BotTyping)
            .await;

        let bot_message = match self.provider.generate(content, &history).await {
            Ok(completion) => {
                let metadata = MessageMetadata {
                    confidence: completion.confidence,
                    model_id: completion.model_id,
                    token_count: completion.token_count,
                    error: false,
                };
                Message::new_assistant(conversation_id, completion.text, metadata)
            }
            Err(e) => {
                tracing::warn!(
                    "[Router] Completion provider failed for conversation {}: {}",
                    conversation_id,
                    e
                );
                let metadata = MessageMetadata {
                    error: true,
                    ..Default::default()
                };
                Message::new_assistant(conversation_id, FALLBACK_REPLY, metadata)
            }
        };

        self.store
            .append_message(conversation_id, bot_message.clone())
            .await?;

        self.registry
            .emit_to_participants(identity, conversation_id, ServerEvent::BotStoppedTyping)
            .await;
        self.registry
            .emit_to_participants(
                identity,
                conversation_id,
                ServerEvent::BotMessage {
                    message: bot_message.clone(),
                },
            )
            .await;

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| BackendError::not_found("Conversation vanished mid-send"))?;

        Ok(SendOutcome {
            conversation,
            user_message,
            bot_message,
        })
    }

    /// Find the caller's conversation or create one titled from the first
    /// message
    async fn locate_or_create(
        &self,
        identity: Uuid,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, BackendError> {
        match conversation_id {
            Some(id) => {
                let conversation = self
                    .store
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| BackendError::not_found(format!("Conversation {} not found", id)))?;
                if conversation.owner != identity {
                    return Err(BackendError::forbidden("Conversation belongs to another identity"));
                }
                if conversation.status != crate::shared::ConversationStatus::Active {
                    return Err(BackendError::handler(
                        StatusCode::CONFLICT,
                        "Conversation is not active",
                    ));
                }
                Ok(conversation)
            }
            None => {
                let conversation = Conversation::new(identity, content);
                tracing::info!(
                    "[Router] Creating conversation {} titled '{}'",
                    conversation.id,
                    conversation.title
                );
                Ok(self.store.create_conversation(conversation).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::completion::{Completion, CompletionError};
    use crate::backend::store::MemoryStore;
    use crate::shared::message::Sender;
    use async_trait::async_trait;

    /// Provider double that replies with a fixed text or a scripted error
    struct ScriptedProvider {
        result: Result<Completion, CompletionError>,
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn generate(
            &self,
            _content: &str,
            _history: &[Message],
        ) -> Result<Completion, CompletionError> {
            self.result.clone()
        }
    }

    fn router_with(result: Result<Completion, CompletionError>) -> (MessageRouter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let provider = Arc::new(ScriptedProvider { result });
        let router = MessageRouter::new(store.clone(), provider, registry, 10);
        (router, store)
    }

    fn ok_completion(text: &str) -> Result<Completion, CompletionError> {
        Ok(Completion {
            text: text.to_string(),
            confidence: Some(0.9),
            model_id: Some("support-small".to_string()),
            token_count: Some(12),
        })
    }

    #[tokio::test]
    async fn test_first_message_creates_titled_conversation() {
        let (router, store) = router_with(ok_completion("Hi! How can I help?"));
        let identity = Uuid::new_v4();

        let outcome = router
            .handle_new_message(identity, "Hello, my order is missing", None)
            .await
            .unwrap();

        assert_eq!(outcome.conversation.title, "Hello, my order is missing");
        assert_eq!(outcome.conversation.owner, identity);
        assert_eq!(outcome.conversation.messages.len(), 2);
        assert_eq!(outcome.user_message.sender, Sender::User);
        assert_eq!(outcome.bot_message.sender, Sender::Assistant);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reply_carries_provider_metadata() {
        let (router, _store) = router_with(ok_completion("Sure thing"));
        let outcome = router
            .handle_new_message(Uuid::new_v4(), "Hello", None)
            .await
            .unwrap();

        let metadata = outcome.bot_message.metadata.unwrap();
        assert_eq!(metadata.model_id.as_deref(), Some("support-small"));
        assert_eq!(metadata.token_count, Some(12));
        assert!(!metadata.error);
    }

    #[tokio::test]
    async fn test_rate_limited_provider_yields_fallback_reply() {
        let (router, store) = router_with(Err(CompletionError::RateLimited { retry_after: Some(30) }));
        let outcome = router
            .handle_new_message(Uuid::new_v4(), "Hello", None)
            .await
            .unwrap();

        assert_eq!(outcome.bot_message.content, FALLBACK_REPLY);
        assert!(outcome.bot_message.metadata.unwrap().error);

        // The user message was still accepted and the reply persisted.
        let stored = store
            .get_conversation(outcome.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_persistence() {
        let (router, store) = router_with(ok_completion("unused"));
        let result = router.handle_new_message(Uuid::new_v4(), "   ", None).await;
        assert!(result.is_err());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_foreign_conversation_rejected() {
        let (router, store) = router_with(ok_completion("Hi"));
        let owner = Uuid::new_v4();
        let conversation = Conversation::new(owner, "Hello");
        let id = conversation.id;
        store.create_conversation(conversation).await.unwrap();

        let result = router
            .handle_new_message(Uuid::new_v4(), "Hello", Some(id))
            .await;
        assert!(matches!(
            result,
            Err(BackendError::HandlerError { status, .. }) if status == StatusCode::FORBIDDEN
        ));
    }

    #[tokio::test]
    async fn test_second_message_appends_to_same_conversation() {
        let (router, _store) = router_with(ok_completion("Hi"));
        let identity = Uuid::new_v4();

        let first = router
            .handle_new_message(identity, "Hello", None)
            .await
            .unwrap();
        let second = router
            .handle_new_message(identity, "Still there?", Some(first.conversation.id))
            .await
            .unwrap();

        assert_eq!(second.conversation.id, first.conversation.id);
        assert_eq!(second.conversation.messages.len(), 4);
        // Title stays derived from the first message.
        assert_eq!(second.conversation.title, "Hello");
    }
}
