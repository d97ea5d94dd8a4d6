/**
 * Error Conversion
 *
 * This module provides conversion implementations for backend errors,
 * allowing them to be returned directly from Axum handlers.
 *
 * # Response Format
 *
 * Error responses are returned as JSON with the following structure:
 * ```json
 * {
 *   "error": "Error message",
 *   "status": 400
 * }
 * ```
 */

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::backend::error::types::BackendError;
use crate::backend::store::StoreError;
use crate::shared::SharedError;

impl BackendError {
    /// The HTTP status code this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            BackendError::HandlerError { status, .. } => *status,
            BackendError::AuthError { .. } => StatusCode::UNAUTHORIZED,
            BackendError::StoreError(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            BackendError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackendError::SharedError(SharedError::ValidationError { .. }) => {
                StatusCode::BAD_REQUEST
            }
            BackendError::SharedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackendError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-facing message for this error
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("[Server] Request failed: {}", message);
        } else {
            tracing::debug!("[Server] Request rejected: {}", message);
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal Server Error"))
                    .unwrap()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_maps_to_401() {
        let err = BackendError::auth("bad token");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validation_error_maps_to_400() {
        let err: BackendError = SharedError::validation("content", "empty").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_conversation_maps_to_404() {
        let err: BackendError = StoreError::not_found(uuid::Uuid::new_v4()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
