//! Conversation Data Structure
//!
//! Represents one support conversation owned by a single identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SharedError;
use super::message::Message;

/// Maximum length of a conversation title, in characters.
pub const MAX_TITLE_LEN: usize = 100;

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
    Archived,
}

/// End-of-conversation feedback left by the owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    /// Rating from 1 to 5
    pub rating: u8,
    pub comment: Option<String>,
}

impl Feedback {
    /// Validate the rating range
    pub fn validate(&self) -> Result<(), SharedError> {
        if !(1..=5).contains(&self.rating) {
            return Err(SharedError::validation("rating", "Rating must be between 1 and 5"));
        }
        Ok(())
    }
}

/// Represents a support conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: Uuid,
    /// Identity that owns the conversation; only the owner may read or
    /// mutate it
    pub owner: Uuid,
    /// Short title, auto-derived from the first message if not set
    pub title: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: ConversationStatus,
    /// Messages in insertion order. Timestamps are informational and never
    /// used to reorder.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Timestamp of the last append (RFC3339 string)
    pub last_activity_at: String,
    /// When the conversation was created (RFC3339 string)
    pub created_at: String,
    /// Optional feedback left when the conversation closes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Conversation {
    /// Create a new conversation with a title derived from the first
    /// message body
    pub fn new(owner: Uuid, first_message: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4(),
            owner,
            title: derive_title(first_message),
            status: ConversationStatus::Active,
            messages: Vec::new(),
            last_activity_at: now.clone(),
            created_at: now,
            feedback: None,
        }
    }

    /// Append a message, updating `last_activity_at`
    pub fn append_message(&mut self, message: Message) {
        self.last_activity_at = message.created_at.clone();
        self.messages.push(message);
    }

    /// The most recent `limit` messages, oldest first
    pub fn recent_messages(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages[skip..].to_vec()
    }

    /// Rename the conversation, enforcing the title length bound
    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), SharedError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(SharedError::validation("title", "Title cannot be empty"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(SharedError::validation(
                "title",
                format!("Title exceeds {} characters", MAX_TITLE_LEN),
            ));
        }
        self.title = title;
        Ok(())
    }
}

/// Derive a conversation title from the first message body.
///
/// Takes a prefix of the message, bounded by [`MAX_TITLE_LEN`].
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }
    if trimmed.chars().count() <= MAX_TITLE_LEN {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(MAX_TITLE_LEN - 3).collect();
        title.push_str("...");
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_derived_from_first_message() {
        let conversation = Conversation::new(Uuid::new_v4(), "My printer is on fire");
        assert_eq!(conversation.title, "My printer is on fire");
    }

    #[test]
    fn test_title_bounded() {
        let long = "y".repeat(500);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_LEN);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_title_from_empty_message() {
        assert_eq!(derive_title("   "), "New conversation");
    }

    #[test]
    fn test_append_updates_last_activity() {
        let owner = Uuid::new_v4();
        let mut conversation = Conversation::new(owner, "Hello");
        let message = Message::new_user(conversation.id, "Hello");
        let stamp = message.created_at.clone();
        conversation.append_message(message);
        assert_eq!(conversation.last_activity_at, stamp);
        assert_eq!(conversation.messages.len(), 1);
    }

    #[test]
    fn test_recent_messages_window() {
        let owner = Uuid::new_v4();
        let mut conversation = Conversation::new(owner, "Hello");
        for i in 0..15 {
            conversation.append_message(Message::new_user(conversation.id, format!("msg {}", i)));
        }
        let recent = conversation.recent_messages(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 5");
        assert_eq!(recent[9].content, "msg 14");
    }

    #[test]
    fn test_feedback_rating_range() {
        assert!(Feedback { rating: 0, comment: None }.validate().is_err());
        assert!(Feedback { rating: 3, comment: None }.validate().is_ok());
        assert!(Feedback { rating: 6, comment: None }.validate().is_err());
    }
}
