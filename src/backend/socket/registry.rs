/**
 * Server Session Registry
 *
 * In-memory mapping from authenticated identity to its live socket
 * sessions and from conversation id to the sessions that joined that
 * room. Nothing here is persisted; the registry lives for the process
 * lifetime and a session's memberships are dropped wholesale when it
 * disconnects.
 *
 * # Emission
 *
 * Each session registers an unbounded sender feeding its socket write
 * loop. Targeted emission walks the identity index or a room and pushes a
 * clone of the event to every live sender; senders whose receiving session
 * is gone are skipped (the disconnect cleanup removes them).
 */

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::shared::event::ServerEvent;

/// Handle to a live socket session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub identity: Uuid,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(
        session_id: Uuid,
        identity: Uuid,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            session_id,
            identity,
            sender,
        }
    }

    /// Queue an event for this session's write loop
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, SessionHandle>,
    /// identity -> session ids
    by_identity: HashMap<Uuid, HashSet<Uuid>>,
    /// conversation id -> session ids that joined the room
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

/// Registry of live socket sessions and their room memberships
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its identity
    pub async fn register(&self, handle: SessionHandle) {
        let mut inner = self.inner.write().await;
        inner
            .by_identity
            .entry(handle.identity)
            .or_default()
            .insert(handle.session_id);
        tracing::info!(
            "[Registry] Session {} registered for identity {}",
            handle.session_id,
            handle.identity
        );
        inner.sessions.insert(handle.session_id, handle);
    }

    /// Remove a session and all of its room memberships
    pub async fn unregister(&self, session_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(handle) = inner.sessions.remove(&session_id) {
            if let Some(sessions) = inner.by_identity.get_mut(&handle.identity) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    inner.by_identity.remove(&handle.identity);
                }
            }
            tracing::info!("[Registry] Session {} unregistered", session_id);
        }
        for members in inner.rooms.values_mut() {
            members.remove(&session_id);
        }
        inner.rooms.retain(|_, members| !members.is_empty());
    }

    /// Add a session to a conversation room
    pub async fn join_conversation(&self, session_id: Uuid, conversation_id: Uuid) {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&session_id) {
            return;
        }
        inner
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(session_id);
        tracing::debug!(
            "[Registry] Session {} joined conversation {}",
            session_id,
            conversation_id
        );
    }

    /// Remove a session from a conversation room
    pub async fn leave_conversation(&self, session_id: Uuid, conversation_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.rooms.get_mut(&conversation_id) {
            members.remove(&session_id);
            if members.is_empty() {
                inner.rooms.remove(&conversation_id);
            }
        }
    }

    /// Emit an event to every session of an identity.
    ///
    /// Returns the number of sessions that received the event.
    pub async fn emit_to_identity(&self, identity: Uuid, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        let Some(session_ids) = inner.by_identity.get(&identity) else {
            return 0;
        };
        let mut delivered = 0;
        for session_id in session_ids {
            if let Some(handle) = inner.sessions.get(session_id) {
                if handle.send(event.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Emit an event to the participants of a conversation: every session
    /// of the owning identity plus any session that joined the room.
    ///
    /// The two sets usually overlap; each session receives the event once.
    pub async fn emit_to_participants(
        &self,
        identity: Uuid,
        conversation_id: Uuid,
        event: ServerEvent,
    ) -> usize {
        let inner = self.inner.read().await;
        let mut targets: HashSet<Uuid> = inner
            .by_identity
            .get(&identity)
            .cloned()
            .unwrap_or_default();
        if let Some(members) = inner.rooms.get(&conversation_id) {
            targets.extend(members.iter().copied());
        }

        let mut delivered = 0;
        for session_id in targets {
            if let Some(handle) = inner.sessions.get(&session_id) {
                if handle.send(event.clone()) {
                    delivered += 1;
                }
            }
        }
        if delivered == 0 {
            tracing::debug!(
                "[Registry] No live sessions for conversation {}",
                conversation_id
            );
        }
        delivered
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Whether a session currently belongs to a room
    pub async fn is_in_conversation(&self, session_id: Uuid, conversation_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(&conversation_id)
            .is_some_and(|members| members.contains(&session_id))
    }
}
