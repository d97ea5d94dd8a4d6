/**
 * Authentication Middleware
 *
 * This module provides middleware for protecting the HTTP fallback routes.
 * It extracts and verifies JWT tokens from the Authorization header and
 * attaches the resolved identity to the request for handlers.
 */

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::backend::auth::sessions::verify_token;

/// Authenticated identity extracted from a JWT token
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub identity: Uuid,
}

/// Authentication middleware
///
/// This middleware:
/// 1. Extracts the JWT token from the Authorization header
/// 2. Verifies the token
/// 3. Attaches the identity to request extensions for use in handlers
///
/// Returns 401 Unauthorized if the token is missing or invalid
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("[Server] Missing Authorization header");
            StatusCode::UNAUTHORIZED
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("[Server] Invalid Authorization header format");
        StatusCode::UNAUTHORIZED
    })?;

    let claims = verify_token(token).map_err(|e| {
        tracing::warn!("[Server] Invalid token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let identity = Uuid::parse_str(&claims.sub).map_err(|e| {
        tracing::error!("[Server] Invalid identity in token: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { identity });

    Ok(next.run(request).await)
}
