//! Dual-path send coordinator.
//!
//! Every outgoing message tries the socket first and falls back to HTTP
//! when the socket is down, rejects the write, or fails to confirm within
//! the confirmation window. Both paths converge on the same state
//! mutations, so the caller cannot tell which one delivered.
//!
//! The two delivery paths are traits so the coordinator's decision logic
//! can be unit tested against scripted doubles.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::state::ConversationState;
use crate::client::ClientError;
use crate::shared::event::{ClientEvent, ServerEvent};
use crate::shared::message::{SendMessageResponse, Sender};

/// How long the socket path may take to confirm a send before the
/// coordinator falls back to HTTP
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// The socket delivery path as the coordinator sees it
pub trait SocketPath: Send + Sync {
    fn is_connected(&self) -> bool;
    fn send_event(&self, event: ClientEvent) -> Result<(), ClientError>;
    /// Subscribe to server events; must be called before the write so a
    /// fast confirmation cannot slip past
    fn confirmations(&self) -> broadcast::Receiver<ServerEvent>;
}

/// The HTTP delivery path as the coordinator sees it
#[async_trait]
pub trait FallbackPath: Send + Sync {
    async fn send_message(
        &self,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<SendMessageResponse, ClientError>;
}

pub struct SendCoordinator<S, F> {
    socket: S,
    fallback: F,
    confirm_timeout: Duration,
}

impl<S: SocketPath, F: FallbackPath> SendCoordinator<S, F> {
    pub fn new(socket: S, fallback: F) -> Self {
        Self::with_confirm_timeout(socket, fallback, DEFAULT_CONFIRM_TIMEOUT)
    }

    pub fn with_confirm_timeout(socket: S, fallback: F, confirm_timeout: Duration) -> Self {
        Self {
            socket,
            fallback,
            confirm_timeout,
        }
    }

    /// Send one message, mutating `state` through the optimistic lifecycle.
    ///
    /// On success the pending entry has been replaced by the confirmed
    /// message; on failure it has been discarded. The lock is never held
    /// across an await.
    pub async fn send(
        &self,
        state: &Mutex<ConversationState>,
        content: &str,
    ) -> Result<(), ClientError> {
        let conversation_id = {
            let mut guard = lock(state);
            let conversation_id = guard.conversation_id();
            guard.add_optimistic_message(content)?;
            conversation_id
        };

        if self.socket.is_connected() {
            match self.try_socket(state, content, conversation_id).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("[Send] Socket path failed, falling back to HTTP: {}", e);
                }
            }
        } else {
            tracing::debug!("[Send] Socket down, using HTTP directly");
        }

        match self.fallback.send_message(content, conversation_id).await {
            Ok(response) => {
                let mut guard = lock(state);
                guard.reconcile(response.user_message);
                guard.apply_bot_message(response.bot_message);
                Ok(())
            }
            Err(e) => {
                lock(state).discard_pending();
                Err(e)
            }
        }
    }

    async fn try_socket(
        &self,
        state: &Mutex<ConversationState>,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<(), ClientError> {
        let mut confirmations = self.socket.confirmations();
        self.socket.send_event(ClientEvent::NewMessage {
            content: content.to_string(),
            conversation_id,
        })?;

        // Confirmations for other sessions of the same identity can share
        // this stream, so only accept the one matching what we sent.
        let confirmed = tokio::time::timeout(self.confirm_timeout, async {
            loop {
                match confirmations.recv().await {
                    Ok(ServerEvent::MessageSent { message })
                        if message.sender == Sender::User
                            && message.content == content
                            && conversation_id
                                .is_none_or(|id| message.conversation_id == id) =>
                    {
                        return Ok(message)
                    }
                    Ok(ServerEvent::Error { message }) => {
                        return Err(ClientError::Network(message))
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ClientError::Closed)
                    }
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout("No send confirmation from server".to_string()))??;

        lock(state).reconcile(confirmed);
        Ok(())
    }
}

fn lock(state: &Mutex<ConversationState>) -> std::sync::MutexGuard<'_, ConversationState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
