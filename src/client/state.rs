//! Client Conversation State
//!
//! The single authoritative in-memory view of the active conversation.
//! All mutation goes through the operations here so the two invariants
//! hold: at most one pending optimistic message exists at a time, and
//! reconciliation is idempotent by server-assigned message id.
//!
//! Consumers (a UI layer) subscribe to [`StateChange`] notifications over
//! a broadcast channel; the state itself has no dependency on any
//! rendering or reactivity machinery.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::ClientError;
use crate::shared::conversation::Conversation;
use crate::shared::message::{validate_content, Message};

/// Notification emitted after each mutation
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// A message was appended (optimistic or confirmed)
    MessageAppended,
    /// The whole list was replaced (conversation switch)
    ConversationLoaded,
    /// Pending messages were discarded without replacement
    PendingDiscarded,
    /// Remote typing status changed
    TypingChanged(bool),
}

/// One entry in the local message list.
///
/// The `pending` marker and `local_id` are client-side only; they are
/// never persisted and are cleared when the server-confirmed twin arrives.
#[derive(Debug, Clone)]
pub struct LocalMessage {
    pub message: Message,
    pub pending: bool,
    pub local_id: Option<Uuid>,
}

/// In-memory view of the active conversation
pub struct ConversationState {
    conversation_id: Option<Uuid>,
    messages: Vec<LocalMessage>,
    bot_typing: bool,
    changes: broadcast::Sender<StateChange>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            conversation_id: None,
            messages: Vec::new(),
            bot_typing: false,
            changes,
        }
    }

    /// Subscribe to state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn bot_typing(&self) -> bool {
        self.bot_typing
    }

    /// Whether an optimistic send is still unacknowledged
    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.pending)
    }

    /// The current message list, pending entries included
    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    /// Append an optimistic message and return its temporary local id.
    ///
    /// Rejects with [`ClientError::SendPending`] while another optimistic
    /// message is outstanding, and with a validation error for content the
    /// server would refuse anyway.
    pub fn add_optimistic_message(&mut self, content: &str) -> Result<Uuid, ClientError> {
        validate_content(content)?;
        if self.has_pending() {
            return Err(ClientError::SendPending);
        }

        let local_id = Uuid::new_v4();
        // The conversation id is a placeholder until the server confirms;
        // new conversations only get a real id on reconciliation.
        let message = Message::new_user(self.conversation_id.unwrap_or(Uuid::nil()), content);
        self.messages.push(LocalMessage {
            message,
            pending: true,
            local_id: Some(local_id),
        });
        self.notify(StateChange::MessageAppended);
        Ok(local_id)
    }

    /// Apply a server-confirmed user message.
    ///
    /// Idempotent: a message id that is already present confirmed is
    /// ignored. Confirmations for a conversation other than the active one
    /// are dropped, so a late socket confirmation arriving after the
    /// fallback already reconciled into a fresh conversation cannot
    /// duplicate the message or hijack the active conversation. The
    /// pending entry is only replaced while a send is actually in flight;
    /// otherwise a new id is appended as a plain confirmed message.
    pub fn reconcile(&mut self, server_message: Message) {
        let already_confirmed = self
            .messages
            .iter()
            .any(|m| !m.pending && m.message.id == server_message.id);
        if already_confirmed {
            tracing::debug!(
                "[State] Ignoring redundant confirmation for message {}",
                server_message.id
            );
            return;
        }

        if let Some(active) = self.conversation_id {
            if active != server_message.conversation_id {
                tracing::debug!(
                    "[State] Ignoring confirmation for conversation {} while {} is active",
                    server_message.conversation_id,
                    active
                );
                return;
            }
        } else if !self.has_pending() {
            // Nothing to anchor this confirmation to.
            return;
        }

        self.messages.retain(|m| !m.pending);
        self.conversation_id = Some(server_message.conversation_id);
        self.messages.push(LocalMessage {
            message: server_message,
            pending: false,
            local_id: None,
        });
        self.notify(StateChange::MessageAppended);
    }

    /// Drop pending messages without replacement; used when a send
    /// definitively fails
    pub fn discard_pending(&mut self) {
        let before = self.messages.len();
        self.messages.retain(|m| !m.pending);
        if self.messages.len() != before {
            self.notify(StateChange::PendingDiscarded);
        }
    }

    /// Append a confirmed assistant message, deduplicated by id.
    /// Replies for a conversation other than the active one are dropped.
    pub fn apply_bot_message(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.message.id == message.id) {
            return;
        }
        if let Some(active) = self.conversation_id {
            if active != message.conversation_id {
                return;
            }
        }
        self.conversation_id.get_or_insert(message.conversation_id);
        self.messages.push(LocalMessage {
            message,
            pending: false,
            local_id: None,
        });
        self.notify(StateChange::MessageAppended);
    }

    /// Reflect remote (assistant) typing status
    pub fn set_typing(&mut self, typing: bool) {
        if self.bot_typing != typing {
            self.bot_typing = typing;
            self.notify(StateChange::TypingChanged(typing));
        }
    }

    /// Switch to another conversation, replacing the message list with its
    /// persisted messages and clearing any pending markers
    pub fn load_conversation(&mut self, conversation: &Conversation) {
        self.conversation_id = Some(conversation.id);
        self.messages = conversation
            .messages
            .iter()
            .cloned()
            .map(|message| LocalMessage {
                message,
                pending: false,
                local_id: None,
            })
            .collect();
        self.bot_typing = false;
        self.notify(StateChange::ConversationLoaded);
    }

    fn notify(&self, change: StateChange) {
        // No subscribers is fine; the state is usable headless.
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_optimistic_then_reconcile() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("Hello").unwrap();
        assert!(state.has_pending());

        let conversation_id = Uuid::new_v4();
        let confirmed = Message::new_user(conversation_id, "Hello");
        state.reconcile(confirmed.clone());

        assert!(!state.has_pending());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].message.id, confirmed.id);
        assert_eq!(state.conversation_id(), Some(conversation_id));
    }

    #[test]
    fn test_second_pending_send_rejected() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("first").unwrap();
        let result = state.add_optimistic_message("second");
        assert_matches!(result, Err(ClientError::SendPending));
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("Hello").unwrap();

        let confirmed = Message::new_user(Uuid::new_v4(), "Hello");
        state.reconcile(confirmed.clone());
        state.reconcile(confirmed.clone());

        let matching = state
            .messages()
            .iter()
            .filter(|m| m.message.id == confirmed.id)
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_late_confirmation_after_fallback_ignored() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("Hello").unwrap();

        // The HTTP fallback already reconciled into a fresh conversation.
        let fallback_confirmed = Message::new_user(Uuid::new_v4(), "Hello");
        state.reconcile(fallback_confirmed.clone());

        // The socket's own confirmation arrives late, carrying a different
        // server id and conversation. It must neither duplicate the message
        // nor move the active conversation.
        let late = Message::new_user(Uuid::new_v4(), "Hello");
        state.reconcile(late);

        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].message.id, fallback_confirmed.id);
        assert_eq!(
            state.conversation_id(),
            Some(fallback_confirmed.conversation_id)
        );
    }

    #[test]
    fn test_confirmation_without_context_ignored() {
        let mut state = ConversationState::new();
        state.reconcile(Message::new_user(Uuid::new_v4(), "stray"));
        assert!(state.messages().is_empty());
        assert_eq!(state.conversation_id(), None);
    }

    #[test]
    fn test_confirmation_without_pending_appends_once() {
        let mut state = ConversationState::new();
        let conversation = Conversation::new(Uuid::new_v4(), "Hello");
        state.load_conversation(&conversation);

        // A confirmed message from another session of the same identity,
        // in the active conversation, lands once.
        let confirmed = Message::new_user(conversation.id, "From elsewhere");
        state.reconcile(confirmed.clone());
        state.reconcile(confirmed);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.conversation_id(), Some(conversation.id));
    }

    #[test]
    fn test_discard_pending_allows_new_send() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("Hello").unwrap();
        state.discard_pending();
        assert!(!state.has_pending());
        assert!(state.add_optimistic_message("Hello again").is_ok());
    }

    #[test]
    fn test_bot_message_deduplicated() {
        let mut state = ConversationState::new();
        let reply = Message::new_assistant(Uuid::new_v4(), "Hi", Default::default());
        state.apply_bot_message(reply.clone());
        state.apply_bot_message(reply);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_bot_message_for_other_conversation_ignored() {
        let mut state = ConversationState::new();
        let conversation_id = Uuid::new_v4();
        state.apply_bot_message(Message::new_assistant(conversation_id, "Hi", Default::default()));
        state.apply_bot_message(Message::new_assistant(
            Uuid::new_v4(),
            "Wrong room",
            Default::default(),
        ));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.conversation_id(), Some(conversation_id));
    }

    #[test]
    fn test_load_conversation_clears_pending() {
        let mut state = ConversationState::new();
        state.add_optimistic_message("orphan").unwrap();

        let mut conversation = Conversation::new(Uuid::new_v4(), "Hello");
        conversation.append_message(Message::new_user(conversation.id, "Hello"));
        state.load_conversation(&conversation);

        assert!(!state.has_pending());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.conversation_id(), Some(conversation.id));
    }

    #[test]
    fn test_validation_rejected_before_append() {
        let mut state = ConversationState::new();
        assert!(state.add_optimistic_message("   ").is_err());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_change_notifications() {
        let mut state = ConversationState::new();
        let mut rx = state.subscribe();
        state.add_optimistic_message("Hello").unwrap();
        state.set_typing(true);
        assert_eq!(rx.try_recv().unwrap(), StateChange::MessageAppended);
        assert_eq!(rx.try_recv().unwrap(), StateChange::TypingChanged(true));
    }
}
