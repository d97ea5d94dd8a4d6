//! Chat Message Data Structure
//!
//! Represents a single message in a support conversation, plus the
//! request/response payloads for the HTTP fallback send path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SharedError;

/// Maximum length of a message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The end user asking for support
    User,
    /// The automated assistant reply
    Assistant,
}

/// Type of message content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// File attachment (content carries the caption, `file_ref` the handle)
    File,
    /// Image attachment
    Image,
}

/// Reply metadata attached by the completion provider at creation time.
///
/// Enrichment happens once, when the assistant message is persisted; the
/// message itself is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageMetadata {
    /// Provider-reported confidence, if any
    pub confidence: Option<f32>,
    /// Model that produced the reply
    pub model_id: Option<String>,
    /// Tokens consumed producing the reply
    pub token_count: Option<u32>,
    /// Set when the reply is the fixed fallback text because the provider
    /// call failed
    #[serde(default)]
    pub error: bool,
}

/// Represents a persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message ID (server-assigned)
    pub id: Uuid,
    /// Conversation this message belongs to
    pub conversation_id: Uuid,
    /// Who sent the message
    pub sender: Sender,
    /// Message content
    pub content: String,
    /// Type of message
    #[serde(default)]
    pub kind: MessageKind,
    /// When the message was created (RFC3339 string)
    pub created_at: String,
    /// Handle to an uploaded file, for `File`/`Image` messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    /// Provider metadata, present on assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Create a new user text message
    pub fn new_user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender: Sender::User,
            content: content.into(),
            kind: MessageKind::Text,
            created_at: chrono::Utc::now().to_rfc3339(),
            file_ref: None,
            metadata: None,
        }
    }

    /// Create a new assistant text message with provider metadata
    pub fn new_assistant(
        conversation_id: Uuid,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender: Sender::Assistant,
            content: content.into(),
            kind: MessageKind::Text,
            created_at: chrono::Utc::now().to_rfc3339(),
            file_ref: None,
            metadata: Some(metadata),
        }
    }

    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let mut preview: String = self.content.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }
}

/// Validate an outgoing message body before it is sent anywhere.
///
/// Rejects empty (or whitespace-only) content and content over
/// [`MAX_MESSAGE_LEN`] characters.
pub fn validate_content(content: &str) -> Result<(), SharedError> {
    if content.trim().is_empty() {
        return Err(SharedError::validation("content", "Message text cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(SharedError::validation(
            "content",
            format!("Message text exceeds {} characters", MAX_MESSAGE_LEN),
        ));
    }
    Ok(())
}

/// Request body for the HTTP fallback send path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Omitted on the first message of a new conversation
    pub conversation_id: Option<Uuid>,
}

/// Response body for the HTTP fallback send path.
///
/// Carries the same outcome the socket path delivers as `messageSent`
/// followed by `botMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub conversation: super::Conversation,
    pub user_message: Message,
    pub bot_message: Message,
}
