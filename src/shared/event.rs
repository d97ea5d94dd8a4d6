//! Socket Protocol Events
//!
//! This module defines the events exchanged over the persistent channel.
//! Events are serialized as internally tagged JSON, e.g.
//! `{"event":"newMessage","content":"Hello"}`.
//!
//! The event set mirrors the fallback HTTP path: a `newMessage` followed by
//! `messageSent` and `botMessage` produces the same stored outcome as one
//! `POST /api/messages` round trip.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// Events sent from the client to the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join the room for a conversation, acked by `joinedConversation`
    JoinConversation { conversation_id: Uuid },
    /// Leave the room for a conversation, acked by `leftConversation`
    LeaveConversation { conversation_id: Uuid },
    /// Send a message; `conversation_id` is omitted on the first message of
    /// a new conversation
    NewMessage {
        content: String,
        conversation_id: Option<Uuid>,
    },
    /// Liveness probe; the server echoes a `heartbeat`
    Ping { timestamp: String },
}

/// Events sent from the server to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Authoritative "ready" signal, emitted once the handshake credential
    /// has been validated. Clients must wait for this rather than the raw
    /// transport-open event.
    ConnectionConfirmed {
        identity: Uuid,
        session_id: Uuid,
        timestamp: String,
    },
    /// Ack for `joinConversation`
    JoinedConversation { conversation_id: Uuid },
    /// Ack for `leaveConversation`
    LeftConversation { conversation_id: Uuid },
    /// Confirms the user message was persisted
    MessageSent { message: Message },
    /// The assistant started composing a reply
    BotTyping,
    /// The assistant stopped composing
    BotStoppedTyping,
    /// Confirms the persisted assistant reply
    BotMessage { message: Message },
    /// Non-fatal error surfaced to the caller
    Error { message: String },
    /// Periodic liveness signal; purely diagnostic
    Heartbeat { timestamp: String },
}

impl ServerEvent {
    /// Heartbeat event stamped with the current time
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat {
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Error event from anything displayable
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::message::Message;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_event_tag_names() {
        let event = ClientEvent::NewMessage {
            content: "Hello".to_string(),
            conversation_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "newMessage");
        assert_eq!(json["content"], "Hello");
    }

    #[test]
    fn test_server_event_round_trip() {
        let message = Message::new_user(Uuid::new_v4(), "Hello");
        let event = ServerEvent::MessageSent { message };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unit_events_serialize_with_tag_only() {
        let json = serde_json::to_value(&ServerEvent::BotTyping).unwrap();
        assert_eq!(json, serde_json::json!({"event": "botTyping"}));
    }

    #[test]
    fn test_connection_confirmed_fields() {
        let event = ServerEvent::ConnectionConfirmed {
            identity: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connectionConfirmed");
        assert!(json["session_id"].is_string());
    }
}
