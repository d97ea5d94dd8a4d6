//! WebSocket transport session.
//!
//! Wraps one connection lifetime: TCP + upgrade, credential handed over in
//! the URL query, then a wait for the server's `connectionConfirmed` event
//! before the session is considered ready. The raw transport-open event is
//! never treated as ready.
//!
//! Once connected, a background task owns the socket. Outgoing
//! [`ClientEvent`]s go through an unbounded channel; incoming
//! [`ServerEvent`]s fan out on a broadcast channel so the send coordinator
//! and the session driver can each watch for what they care about.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, tungstenite};
use uuid::Uuid;

use crate::client::ClientError;
use crate::shared::event::{ClientEvent, ServerEvent};

/// Why a transport session ended.
///
/// An intentional client disconnect must never be mistaken for a failure,
/// so the reason travels with the closed signal.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The client asked for the close; no reconnect should follow
    ClientInitiated,
    /// The server closed or the link dropped
    Remote(String),
}

/// One live, confirmed WebSocket session
pub struct Transport {
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    events: broadcast::Sender<ServerEvent>,
    shutdown: watch::Sender<bool>,
    closed: watch::Receiver<Option<DisconnectReason>>,
    last_heartbeat: watch::Receiver<Option<String>>,
    session_id: Uuid,
    identity: Uuid,
}

impl Transport {
    /// Connect, authenticate, and wait for the server's ready signal.
    ///
    /// Errors are classified for the reconnection machinery: a rejected
    /// credential is [`ClientError::Authentication`] (terminal for this
    /// credential), an expired wait is [`ClientError::Timeout`], and
    /// everything else is [`ClientError::Network`] (retryable).
    pub async fn connect(
        ws_url: &str,
        token: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let url = format!("{}?token={}", ws_url, token);
        tracing::info!("[Transport] Connecting to {}", ws_url);

        let connect = tokio::time::timeout(handshake_timeout, connect_async(&url));
        let (mut ws_stream, _) = match connect.await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(classify_connect_error(e)),
            Err(_) => {
                return Err(ClientError::Timeout(
                    "WebSocket handshake timed out".to_string(),
                ))
            }
        };

        // Drain frames until connectionConfirmed; the server sends it first
        // but interleaved heartbeats are tolerated.
        let confirmed = tokio::time::timeout(handshake_timeout, async {
            loop {
                match ws_stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(ServerEvent::ConnectionConfirmed {
                                identity,
                                session_id,
                                ..
                            }) => return Ok((identity, session_id)),
                            Ok(ServerEvent::Error { message }) => {
                                return Err(ClientError::Network(message))
                            }
                            Ok(_) | Err(_) => continue,
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err(ClientError::Network(
                            "Connection closed before confirmation".to_string(),
                        ))
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(ClientError::Network(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| {
            ClientError::Timeout("No connection confirmation from server".to_string())
        })??;

        let (identity, session_id) = confirmed;
        tracing::info!("[Transport] Session {} confirmed", session_id);

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(None);
        let (heartbeat_tx, heartbeat_rx) = watch::channel(None);

        tokio::spawn(run_socket(
            ws_stream,
            outgoing_rx,
            events_tx.clone(),
            shutdown_rx,
            closed_tx,
            heartbeat_tx,
        ));

        Ok(Self {
            outgoing: outgoing_tx,
            events: events_tx,
            shutdown: shutdown_tx,
            closed: closed_rx,
            last_heartbeat: heartbeat_rx,
            session_id,
            identity,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    /// Queue an event for the socket task to write
    pub fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.outgoing
            .send(event)
            .map_err(|_| ClientError::Closed)
    }

    /// Subscribe to incoming server events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Watch for the session ending and why
    pub fn closed(&self) -> watch::Receiver<Option<DisconnectReason>> {
        self.closed.clone()
    }

    pub fn is_open(&self) -> bool {
        self.closed.borrow().is_none()
    }

    /// Timestamp of the last server heartbeat, diagnostics only. A stale
    /// value is never treated as a failure by itself.
    pub fn last_heartbeat_at(&self) -> Option<String> {
        self.last_heartbeat.borrow().clone()
    }

    /// Ask the socket task to close cleanly
    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn classify_connect_error(error: tungstenite::Error) -> ClientError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                ClientError::Authentication(format!("Server rejected credential ({})", status))
            } else {
                ClientError::Network(format!("Handshake failed with status {}", status))
            }
        }
        other => ClientError::Network(other.to_string()),
    }
}

async fn run_socket(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
    events: broadcast::Sender<ServerEvent>,
    mut shutdown: watch::Receiver<bool>,
    closed: watch::Sender<Option<DisconnectReason>>,
    last_heartbeat: watch::Sender<Option<String>>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    let mut ping = tokio::time::interval(Duration::from_secs(30));
    // Skip the immediate first tick.
    ping.tick().await;

    let reason = loop {
        tokio::select! {
            _ = ping.tick() => {
                let event = ClientEvent::Ping {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                if let Ok(text) = serde_json::to_string(&event) {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        break DisconnectReason::Remote(e.to_string());
                    }
                }
            }
            _ = shutdown.changed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break DisconnectReason::ClientInitiated;
            }
            event = outgoing.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break DisconnectReason::ClientInitiated;
                };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            break DisconnectReason::Remote(e.to_string());
                        }
                    }
                    Err(e) => {
                        tracing::error!("[Transport] Failed to serialize event: {}", e);
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if let ServerEvent::Heartbeat { timestamp } = &event {
                                    let _ = last_heartbeat.send(Some(timestamp.clone()));
                                }
                                let _ = events.send(event);
                            }
                            Err(e) => {
                                tracing::warn!("[Transport] Unparseable server event: {}", e);
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let detail = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "Server closed connection".to_string());
                        break DisconnectReason::Remote(detail);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break DisconnectReason::Remote(e.to_string()),
                    None => break DisconnectReason::Remote("Connection dropped".to_string()),
                }
            }
        }
    };

    tracing::info!("[Transport] Session ended: {:?}", reason);
    let _ = closed.send(Some(reason));
}
