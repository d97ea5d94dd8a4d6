/**
 * Server Initialization
 *
 * This module handles the initialization and setup of the Axum HTTP
 * server: state creation, collaborator wiring, and route configuration.
 *
 * # Initialization Process
 *
 * 1. Load configuration from the environment
 * 2. Create the session registry and the conversation store
 * 3. Wire the completion provider
 * 4. Build the message router on top of those collaborators
 * 5. Create the router with all routes and middleware
 */

use std::sync::Arc;

use axum::Router;

use crate::backend::chat::MessageRouter;
use crate::backend::completion::CompletionProvider;
use crate::backend::routes::router::create_router;
use crate::backend::server::config::{load_completion_provider, ServerConfig};
use crate::backend::server::state::AppState;
use crate::backend::socket::SessionRegistry;
use crate::backend::store::{ConversationStore, MemoryStore};

/// Create and configure the Axum application from environment config
pub async fn create_app() -> Router<()> {
    let config = ServerConfig::from_env();
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
    let provider = load_completion_provider(&config);
    create_app_with(config, store, provider)
}

/// Create the application with explicit collaborators.
///
/// Used by tests to substitute a scripted provider or a pre-seeded store.
pub fn create_app_with(
    config: ServerConfig,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
) -> Router<()> {
    tracing::info!("Initializing helpline backend server");

    let registry = Arc::new(SessionRegistry::new());
    let message_router = Arc::new(MessageRouter::new(
        store.clone(),
        provider,
        registry.clone(),
        config.history_window,
    ));

    let app_state = AppState {
        registry,
        store,
        message_router,
        config: Arc::new(config),
    };

    create_router(app_state)
}
