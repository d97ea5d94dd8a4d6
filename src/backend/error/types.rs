/**
 * Backend Error Types
 *
 * This module defines error types specific to the backend server.
 * These errors are used in HTTP and socket handlers and can be converted
 * to HTTP responses.
 *
 * # Error Types
 *
 * - `HandlerError` - request-level failures with an explicit status code
 * - `AuthError` - credential check failures (missing/invalid/expired token)
 * - `StoreError` - persistence seam failures
 * - `SharedError` / `SerializationError` - wrapped shared-layer failures
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::store::StoreError;
use crate::shared::SharedError;

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Handler error (e.g., malformed request, forbidden access)
    #[error("Handler error: {message}")]
    HandlerError {
        /// HTTP status code for this error
        status: StatusCode,
        /// Human-readable error message
        message: String,
    },

    /// Credential check failure
    #[error("Authentication error: {message}")]
    AuthError {
        /// Human-readable error message
        message: String,
    },

    /// Persistence seam failure
    #[error(transparent)]
    StoreError(#[from] StoreError),

    /// Shared error (from the shared module)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new handler error with a status code
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    /// Shorthand for a 404 handler error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::handler(StatusCode::NOT_FOUND, message)
    }

    /// Shorthand for a 403 handler error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::handler(StatusCode::FORBIDDEN, message)
    }
}
