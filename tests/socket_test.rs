//! End-to-end tests over a real TCP socket: the actual client stack
//! (transport, session driver, send coordinator) against the actual
//! server (socket session handler, registry, message router).

mod common;

use std::time::Duration;

use axum::Router;
use tokio::net::{TcpListener, TcpSocket};
use tokio::time::timeout;
use uuid::Uuid;

use helpline::client::reconnect::RetryPolicy;
use helpline::client::transport::Transport;
use helpline::client::{ChatSession, ClientError, ConnectionStatus, SessionConfig};
use helpline::shared::event::{ClientEvent, ServerEvent};

use common::{app_with_reply, test_identity};

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(app: Router<()>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn ws_url(port: u16) -> String {
    format!("ws://127.0.0.1:{}/ws", port)
}

fn api_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<ServerEvent>,
) -> ServerEvent {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("event channel closed");
        // Heartbeats can interleave with anything.
        if !matches!(event, ServerEvent::Heartbeat { .. }) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_socket_send_roundtrip() {
    let (app, _store) = app_with_reply("We can look into that order.");
    let port = spawn_server(app).await;
    let (identity, token) = test_identity();

    let transport = Transport::connect(&ws_url(port), &token, WAIT)
        .await
        .expect("connect failed");
    assert_eq!(transport.identity(), identity);

    let mut events = transport.subscribe();
    transport
        .send(ClientEvent::NewMessage {
            content: "Where is my order?".to_string(),
            conversation_id: None,
        })
        .unwrap();

    let sent = next_event(&mut events).await;
    let ServerEvent::MessageSent { message } = sent else {
        panic!("expected messageSent, got {:?}", sent);
    };
    assert_eq!(message.content, "Where is my order?");

    assert!(matches!(next_event(&mut events).await, ServerEvent::BotTyping));
    assert!(matches!(
        next_event(&mut events).await,
        ServerEvent::BotStoppedTyping
    ));

    let reply = next_event(&mut events).await;
    let ServerEvent::BotMessage { message: bot } = reply else {
        panic!("expected botMessage, got {:?}", reply);
    };
    assert_eq!(bot.content, "We can look into that order.");
    assert_eq!(bot.conversation_id, message.conversation_id);

    transport.disconnect();
}

#[tokio::test]
async fn test_join_and_leave_acked() {
    let (app, _store) = app_with_reply("Hi");
    let port = spawn_server(app).await;
    let (_identity, token) = test_identity();

    let transport = Transport::connect(&ws_url(port), &token, WAIT)
        .await
        .unwrap();
    let mut events = transport.subscribe();
    let conversation_id = Uuid::new_v4();

    transport
        .send(ClientEvent::JoinConversation { conversation_id })
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ServerEvent::JoinedConversation { conversation_id }
    );

    transport
        .send(ClientEvent::LeaveConversation { conversation_id })
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ServerEvent::LeftConversation { conversation_id }
    );
}

#[tokio::test]
async fn test_bad_token_rejected_before_upgrade() {
    let (app, _store) = app_with_reply("Hi");
    let port = spawn_server(app).await;

    let result = Transport::connect(&ws_url(port), "not-a-jwt", WAIT).await;
    assert!(matches!(result, Err(ClientError::Authentication(_))));
}

#[tokio::test]
async fn test_failed_connect_surfaces_last_error() {
    let (app, _store) = app_with_reply("Hi");
    let port = spawn_server(app).await;

    let session = ChatSession::new(SessionConfig::new(
        ws_url(port),
        api_url(port),
        "not-a-jwt",
    ));
    assert_eq!(*session.last_error().borrow(), None);
    session.connect();

    let mut last_error = session.last_error();
    let error = timeout(WAIT, last_error.wait_for(|e| e.is_some()))
        .await
        .expect("no connection error surfaced")
        .unwrap()
        .clone()
        .unwrap();
    assert!(error.contains("Authentication failed"), "got: {}", error);

    // Bad credentials do not trigger retries.
    let mut status = session.status();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Disconnected))
        .await
        .expect("never settled")
        .unwrap();
}

#[tokio::test]
async fn test_session_send_over_socket() {
    let (app, _store) = app_with_reply("Glad to help.");
    let port = spawn_server(app).await;
    let (_identity, token) = test_identity();

    let session = ChatSession::new(SessionConfig::new(ws_url(port), api_url(port), token));
    let mut events = session.events();
    session.connect();

    let mut status = session.status();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("never connected")
        .unwrap();

    session.send_message("Hello there").await.unwrap();

    // The confirmed user message is in state, pending cleared.
    {
        let state = session.state();
        let guard = state.lock().unwrap();
        assert!(!guard.has_pending());
        assert!(guard
            .messages()
            .iter()
            .any(|m| m.message.content == "Hello there"));
    }

    // The reply arrives as a live event and lands in state.
    loop {
        if let ServerEvent::BotMessage { message } = next_event(&mut events).await {
            assert_eq!(message.content, "Glad to help.");
            break;
        }
    }
    let state = session.state();
    timeout(WAIT, async {
        loop {
            {
                let guard = state.lock().unwrap();
                if guard.messages().len() == 2 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bot message never applied to state");
}

#[tokio::test]
async fn test_session_falls_back_when_not_connected() {
    let (app, _store) = app_with_reply("Over HTTP, same answer.");
    let port = spawn_server(app).await;
    let (_identity, token) = test_identity();

    // Never connected; the coordinator must go straight to HTTP.
    let session = ChatSession::new(SessionConfig::new(ws_url(port), api_url(port), token));
    session.send_message("Anyone there?").await.unwrap();

    let state = session.state();
    let guard = state.lock().unwrap();
    assert!(!guard.has_pending());
    assert_eq!(guard.messages().len(), 2);
    assert_eq!(guard.messages()[1].message.content, "Over HTTP, same answer.");
}

/// Byte-forwarding proxy whose connections die when it is shut down.
/// Lets a test sever the link without touching the server.
struct FlakyProxy {
    port: u16,
    accept_task: tokio::task::JoinHandle<()>,
    connections: std::sync::Arc<std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl FlakyProxy {
    async fn start(upstream_port: u16, port: Option<u16>) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_reuseaddr(true).unwrap();
        socket
            .bind(format!("127.0.0.1:{}", port.unwrap_or(0)).parse().unwrap())
            .unwrap();
        let listener = socket.listen(16).unwrap();
        let port = listener.local_addr().unwrap().port();

        let connections =
            std::sync::Arc::new(std::sync::Mutex::new(Vec::<tokio::task::JoinHandle<()>>::new()));
        let tracked = connections.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((mut inbound, _)) = listener.accept().await else {
                    break;
                };
                let task = tokio::spawn(async move {
                    let Ok(mut outbound) =
                        tokio::net::TcpStream::connect(("127.0.0.1", upstream_port)).await
                    else {
                        return;
                    };
                    let _ =
                        tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                });
                tracked.lock().unwrap().push(task);
            }
        });

        Self {
            port,
            accept_task,
            connections,
        }
    }

    /// Drop the listener and every live connection
    fn kill(self) -> u16 {
        self.accept_task.abort();
        for task in self.connections.lock().unwrap().drain(..) {
            task.abort();
        }
        self.port
    }
}

#[tokio::test]
async fn test_session_reconnects_after_remote_drop() {
    let (app, _store) = app_with_reply("Back again.");
    let server_port = spawn_server(app).await;
    let (_identity, token) = test_identity();

    let proxy = FlakyProxy::start(server_port, None).await;
    let proxy_port = proxy.port;

    let mut config = SessionConfig::new(
        ws_url(proxy_port),
        api_url(server_port),
        token,
    );
    config.retry_policy = RetryPolicy {
        base_delay: Duration::from_millis(100),
        cap_delay: Duration::from_millis(400),
        max_retries: 10,
    };
    let session = ChatSession::new(config);
    session.connect();

    let mut status = session.status();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("never connected")
        .unwrap();

    // Sever the link. The accepted proxy sockets die with their tasks,
    // which the client sees as a remote disconnect.
    let port = proxy.kill();
    timeout(
        WAIT,
        status.wait_for(|s| *s == ConnectionStatus::Reconnecting || *s == ConnectionStatus::Connecting),
    )
    .await
    .expect("never noticed the drop")
    .unwrap();

    // Bring the path back on the same port; a retry should land.
    let _proxy = FlakyProxy::start(server_port, Some(port)).await;
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("never reconnected")
        .unwrap();
}

#[tokio::test]
async fn test_client_disconnect_is_terminal() {
    let (app, _store) = app_with_reply("Hi");
    let port = spawn_server(app).await;
    let (_identity, token) = test_identity();

    let session = ChatSession::new(SessionConfig::new(ws_url(port), api_url(port), token));
    session.connect();

    let mut status = session.status();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("never connected")
        .unwrap();

    session.disconnect();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Disconnected))
        .await
        .expect("never disconnected")
        .unwrap();

    // No reconnect attempt follows an intentional disconnect.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*session.status().borrow(), ConnectionStatus::Disconnected);
}
