//! Client half of the delivery subsystem.
//!
//! A [`session::ChatSession`] owns the moving parts: the reconnecting
//! [`transport::Transport`], the [`reconnect`] state machine driving it,
//! the [`state::ConversationState`] holding the optimistic message list,
//! and the [`send::SendCoordinator`] that falls back to the HTTP
//! [`api::ApiClient`] when the socket cannot confirm a send.

use thiserror::Error;

use crate::shared::SharedError;

pub mod api;
pub mod reconnect;
pub mod send;
pub mod session;
pub mod state;
pub mod transport;

pub use reconnect::{ConnectionStatus, RetryPolicy};
pub use session::{ChatSession, SessionConfig};
pub use state::ConversationState;

/// Client-side error taxonomy.
///
/// Authentication failures are terminal for the attempt and never
/// auto-retried with the same credential; network and timeout failures
/// drive the reconnection machinery; validation failures are rejected
/// before anything is sent.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad, missing, or expired credential
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The outgoing message failed validation; nothing was sent
    #[error(transparent)]
    Validation(#[from] SharedError),

    /// The server answered with an error status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A previous optimistic send is still unacknowledged
    #[error("A send is already pending")]
    SendPending,

    /// The session has been torn down
    #[error("Session closed")]
    Closed,
}

impl ClientError {
    /// Whether the fallback path may transparently retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
