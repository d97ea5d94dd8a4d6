/**
 * API Routes
 *
 * Authenticated HTTP routes. `POST /messages` is the fallback transport
 * for the live chat path: it delivers into the same message router as the
 * socket, so both transports are alternate deliveries of one operation.
 * The conversation routes are the plumbing around it: list, fetch, update,
 * feedback, delete.
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::middleware::auth::AuthenticatedUser;
use crate::backend::server::state::AppState;
use crate::shared::conversation::{Conversation, ConversationStatus, Feedback};
use crate::shared::message::{SendMessageRequest, SendMessageResponse};

/// Configure the authenticated API routes
pub fn configure_api_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/{id}",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route("/conversations/{id}/feedback", post(set_feedback))
}

/// `POST /api/messages`, the fallback send path
async fn send_message(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, BackendError> {
    let outcome = app
        .message_router
        .handle_new_message(user.identity, &request.content, request.conversation_id)
        .await?;

    Ok(Json(SendMessageResponse {
        conversation: outcome.conversation,
        user_message: outcome.user_message,
        bot_message: outcome.bot_message,
    }))
}

/// `GET /api/conversations`
async fn list_conversations(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Conversation>>, BackendError> {
    Ok(Json(app.store.list_conversations(user.identity).await?))
}

/// `GET /api/conversations/{id}`
async fn get_conversation(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, BackendError> {
    Ok(Json(owned_conversation(&app, &user, id).await?))
}

/// Update body for `PATCH /api/conversations/{id}`
#[derive(Debug, Deserialize)]
struct UpdateConversationRequest {
    title: Option<String>,
    status: Option<ConversationStatus>,
}

/// `PATCH /api/conversations/{id}`: rename or change status
async fn update_conversation(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateConversationRequest>,
) -> Result<Json<Conversation>, BackendError> {
    owned_conversation(&app, &user, id).await?;
    let updated = app
        .store
        .update_conversation(id, request.title, request.status)
        .await?;
    Ok(Json(updated))
}

/// `POST /api/conversations/{id}/feedback`
async fn set_feedback(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(feedback): Json<Feedback>,
) -> Result<StatusCode, BackendError> {
    feedback.validate()?;
    owned_conversation(&app, &user, id).await?;
    app.store.set_feedback(id, feedback).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/conversations/{id}`
async fn delete_conversation(
    State(app): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, BackendError> {
    owned_conversation(&app, &user, id).await?;
    app.store.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch a conversation, enforcing that the caller owns it
async fn owned_conversation(
    app: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
) -> Result<Conversation, BackendError> {
    let conversation = app
        .store
        .get_conversation(id)
        .await?
        .ok_or_else(|| BackendError::not_found(format!("Conversation {} not found", id)))?;
    if conversation.owner != user.identity {
        return Err(BackendError::forbidden("Conversation belongs to another identity"));
    }
    Ok(conversation)
}
