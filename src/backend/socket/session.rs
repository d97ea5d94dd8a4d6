/**
 * Socket Session Handler
 *
 * One authenticated WebSocket connection. The credential is validated
 * before the upgrade completes; the first event on the wire is always
 * `connectionConfirmed`, which clients treat as the authoritative ready
 * signal.
 *
 * # Event Loop
 *
 * After the upgrade the session runs a single select loop over:
 * - the registry-fed outbound queue (events emitted by the router)
 * - the heartbeat interval (30s by default, diagnostics only)
 * - inbound frames from the client
 *
 * Inbound `newMessage` events are routed inline, so message append order
 * for one session equals the order its events arrived.
 */

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::auth::sessions::identity_from_token;
use crate::backend::server::state::AppState;
use crate::backend::socket::SessionHandle;
use crate::shared::event::{ClientEvent, ServerEvent};

/// Handshake query parameters
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// JWT credential presented during the handshake
    pub token: Option<String>,
}

/// `GET /ws` upgrade handler.
///
/// Rejects with 401 before the channel becomes usable when the credential
/// is missing or invalid.
pub async fn ws_handler(
    State(app): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        tracing::warn!("[Socket] Connect rejected: missing credential");
        return (StatusCode::UNAUTHORIZED, "missing credential").into_response();
    };

    match identity_from_token(&token) {
        Ok(identity) => ws.on_upgrade(move |socket| handle_socket(socket, identity, app)),
        Err(e) => {
            tracing::warn!("[Socket] Connect rejected: {}", e);
            (StatusCode::UNAUTHORIZED, "invalid credential").into_response()
        }
    }
}

/// Drive one upgraded socket until it disconnects
async fn handle_socket(socket: WebSocket, identity: Uuid, app: AppState) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    app.registry
        .register(SessionHandle::new(session_id, identity, tx.clone()))
        .await;

    // Authoritative ready signal; a transport can open before this point,
    // so clients must wait for it rather than transport-open.
    let _ = tx.send(ServerEvent::ConnectionConfirmed {
        identity,
        session_id,
        timestamp: chrono::Utc::now().to_rfc3339(),
    });

    let mut heartbeat = tokio::time::interval(app.config.heartbeat_interval);
    // The first tick completes immediately; consume it so heartbeats start
    // one interval after connect.
    heartbeat.tick().await;

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("[Socket] Failed to serialize event: {}", e);
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(json.into())).await.is_err() {
                    tracing::debug!("[Socket] Session {} write failed, closing", session_id);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let _ = tx.send(ServerEvent::heartbeat_now());
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch_event(&text, session_id, identity, &app, &tx).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!("[Socket] Session {} disconnected", session_id);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames are ignored; axum answers
                        // protocol-level pings itself.
                    }
                    Some(Err(e)) => {
                        tracing::warn!("[Socket] Session {} transport error: {}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    app.registry.unregister(session_id).await;
}

/// Parse and handle one inbound client event
async fn dispatch_event(
    text: &str,
    session_id: Uuid,
    identity: Uuid,
    app: &AppState,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("[Socket] Session {} sent malformed event: {}", session_id, e);
            let _ = tx.send(ServerEvent::error("malformed event"));
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            app.registry.join_conversation(session_id, conversation_id).await;
            let _ = tx.send(ServerEvent::JoinedConversation { conversation_id });
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            app.registry.leave_conversation(session_id, conversation_id).await;
            let _ = tx.send(ServerEvent::LeftConversation { conversation_id });
        }
        ClientEvent::Ping { .. } => {
            let _ = tx.send(ServerEvent::heartbeat_now());
        }
        ClientEvent::NewMessage {
            content,
            conversation_id,
        } => {
            // Routed inline: the confirmation events are emitted by the
            // router through the registry, so this session (and any other
            // session of the identity) sees messageSent/botMessage.
            if let Err(e) = app
                .message_router
                .handle_new_message(identity, &content, conversation_id)
                .await
            {
                tracing::warn!("[Socket] Session {} send failed: {}", session_id, e);
                let _ = tx.send(ServerEvent::error(e.message()));
            }
        }
    }
}
