/**
 * Router Configuration
 *
 * This module provides the main router creation function that combines
 * all route configurations into a single Axum router.
 *
 * # Route Details
 *
 * - `GET /ws` - WebSocket upgrade (credential in the `token` query
 *   parameter, validated before the upgrade)
 * - `POST /api/messages` - fallback send, same outcome as the socket path
 * - `GET /api/conversations` - list the caller's conversations
 * - `GET /api/conversations/{id}` - fetch one conversation with messages
 * - `PATCH /api/conversations/{id}` - update title/status
 * - `POST /api/conversations/{id}/feedback` - record feedback
 * - `DELETE /api/conversations/{id}` - delete a conversation
 * - `GET /health` - liveness probe, unauthenticated
 */

use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backend::middleware::auth::auth_middleware;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;
use crate::backend::socket::ws_handler;

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router<()> {
    let api = configure_api_routes().layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe
async fn health() -> &'static str {
    "ok"
}
