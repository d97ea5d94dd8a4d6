/**
 * Application State Management
 *
 * This module defines the application state structure shared by every
 * handler.
 *
 * # Thread Safety
 *
 * All state is designed to be thread-safe:
 * - `Arc<SessionRegistry>` guards its maps with a tokio `RwLock`
 * - the store and provider are trait objects behind `Arc`
 * - `Arc<ServerConfig>` is immutable after startup
 */

use std::sync::Arc;

use crate::backend::chat::MessageRouter;
use crate::backend::server::config::ServerConfig;
use crate::backend::socket::SessionRegistry;
use crate::backend::store::ConversationStore;

/// Central state container handed to axum via `with_state`
#[derive(Clone)]
pub struct AppState {
    /// Live socket sessions and conversation rooms
    pub registry: Arc<SessionRegistry>,
    /// Conversation document store
    pub store: Arc<dyn ConversationStore>,
    /// The single operation both transports deliver into
    pub message_router: Arc<MessageRouter>,
    /// Runtime configuration
    pub config: Arc<ServerConfig>,
}
