/**
 * Middleware Module
 *
 * Request middleware for the HTTP fallback routes.
 */

pub mod auth;

pub use auth::{auth_middleware, AuthenticatedUser};
