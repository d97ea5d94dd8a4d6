/**
 * Backend Module
 *
 * The axum server: socket sessions, session registry, message router,
 * HTTP fallback routes, and the external collaborator seams (store,
 * completion provider, auth capability check).
 */

pub mod auth;
pub mod chat;
pub mod completion;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod socket;
pub mod store;
