//! Session driver tying the client pieces together.
//!
//! A [`ChatSession`] spawns one background driver task that owns the
//! [`ConnectionMachine`] and the live [`Transport`]. Commands from the
//! caller and internal events (connect outcomes, retry timers, remote
//! closes) feed the machine; the driver executes the effects it returns.
//! Connection status and the last connection error are published on watch
//! channels and server events on a broadcast channel, all of which
//! survive reconnects.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::api::ApiClient;
use crate::client::reconnect::{
    ConnectionEvent, ConnectionMachine, ConnectionStatus, Effect, RetryPolicy,
};
use crate::client::send::{FallbackPath, SendCoordinator, SocketPath, DEFAULT_CONFIRM_TIMEOUT};
use crate::client::state::ConversationState;
use crate::client::transport::{DisconnectReason, Transport};
use crate::client::ClientError;
use crate::shared::event::{ClientEvent, ServerEvent};
use crate::shared::message::SendMessageResponse;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_url: String,
    pub api_url: String,
    pub token: String,
    pub retry_policy: RetryPolicy,
    pub handshake_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl SessionConfig {
    pub fn new(
        ws_url: impl Into<String>,
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            token: token.into(),
            retry_policy: RetryPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }
}

enum Command {
    Connect,
    Disconnect,
    Join(Uuid),
    Leave(Uuid),
}

enum Internal {
    ConnectOutcome(Result<Transport, ClientError>),
    RetryFired,
    RemoteClosed(String),
}

/// Live transport slot shared between the driver and the send coordinator.
///
/// The slot is empty while disconnected; the driver swaps transports in
/// and out across reconnects without the coordinator noticing.
#[derive(Clone)]
struct TransportSlot {
    inner: Arc<RwLock<Option<Transport>>>,
    events: broadcast::Sender<ServerEvent>,
}

impl TransportSlot {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Transport>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn replace(&self, transport: Option<Transport>) -> Option<Transport> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut guard, transport)
    }
}

impl SocketPath for TransportSlot {
    fn is_connected(&self) -> bool {
        self.read().as_ref().map(Transport::is_open).unwrap_or(false)
    }

    fn send_event(&self, event: ClientEvent) -> Result<(), ClientError> {
        match self.read().as_ref() {
            Some(transport) => transport.send(event),
            None => Err(ClientError::Closed),
        }
    }

    fn confirmations(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl FallbackPath for Arc<ApiClient> {
    async fn send_message(
        &self,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<SendMessageResponse, ClientError> {
        ApiClient::send_message(self, content, conversation_id).await
    }
}

pub struct ChatSession {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    last_error: watch::Receiver<Option<String>>,
    state: Arc<Mutex<ConversationState>>,
    coordinator: SendCoordinator<TransportSlot, Arc<ApiClient>>,
    api: Arc<ApiClient>,
    events: broadcast::Sender<ServerEvent>,
}

impl ChatSession {
    pub fn new(config: SessionConfig) -> Self {
        let state = Arc::new(Mutex::new(ConversationState::new()));
        let (events, _) = broadcast::channel(256);
        let slot = TransportSlot {
            inner: Arc::new(RwLock::new(None)),
            events: events.clone(),
        };
        let api = Arc::new(ApiClient::new(
            config.api_url.clone(),
            config.token.clone(),
        ));
        let coordinator = SendCoordinator::with_confirm_timeout(
            slot.clone(),
            api.clone(),
            config.confirm_timeout,
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (last_error_tx, last_error_rx) = watch::channel(None);

        let machine = ConnectionMachine::new(config.retry_policy.clone());
        let driver = Driver {
            config,
            machine,
            slot,
            state: state.clone(),
            events: events.clone(),
            status: status_tx,
            last_error: last_error_tx,
            retry_timer: None,
            joined: None,
        };
        tokio::spawn(driver.run(commands_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            last_error: last_error_rx,
            state,
            coordinator,
            api,
            events,
        }
    }

    /// Start connecting; progress is observable via [`Self::status`]
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the socket intentionally; no reconnect will follow
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    pub fn join_conversation(&self, conversation_id: Uuid) {
        let _ = self.commands.send(Command::Join(conversation_id));
    }

    pub fn leave_conversation(&self, conversation_id: Uuid) {
        let _ = self.commands.send(Command::Leave(conversation_id));
    }

    /// Send a message through the dual-path coordinator
    pub async fn send_message(&self, content: &str) -> Result<(), ClientError> {
        self.coordinator.send(&self.state, content).await
    }

    /// Fetch a conversation's history, load it into local state, and join
    /// its room for live events
    pub async fn open_conversation(&self, conversation_id: Uuid) -> Result<(), ClientError> {
        let conversation = self.api.get_conversation(conversation_id).await?;
        {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.load_conversation(&conversation);
        }
        self.join_conversation(conversation_id);
        Ok(())
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// The most recent connection error, cleared on a successful connect
    pub fn last_error(&self) -> watch::Receiver<Option<String>> {
        self.last_error.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> Arc<Mutex<ConversationState>> {
        self.state.clone()
    }
}

struct Driver {
    config: SessionConfig,
    machine: ConnectionMachine,
    slot: TransportSlot,
    state: Arc<Mutex<ConversationState>>,
    events: broadcast::Sender<ServerEvent>,
    status: watch::Sender<ConnectionStatus>,
    last_error: watch::Sender<Option<String>>,
    retry_timer: Option<JoinHandle<()>>,
    joined: Option<Uuid>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (internal_tx, mut internal_rx) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        // Session handle dropped; tear everything down.
                        if let Some(transport) = self.slot.replace(None) {
                            transport.disconnect();
                        }
                        if let Some(timer) = self.retry_timer.take() {
                            timer.abort();
                        }
                        break;
                    };
                    self.handle_command(command, &internal_tx);
                }
                internal = internal_rx.recv() => {
                    let Some(internal) = internal else { break };
                    self.handle_internal(internal, &internal_tx);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command, internal: &mpsc::UnboundedSender<Internal>) {
        match command {
            Command::Connect => self.apply(ConnectionEvent::ConnectRequested, internal),
            Command::Disconnect => {
                if let Some(transport) = self.slot.replace(None) {
                    transport.disconnect();
                }
                self.apply(ConnectionEvent::ClientDisconnect, internal);
            }
            Command::Join(conversation_id) => {
                self.joined = Some(conversation_id);
                self.send_if_open(ClientEvent::JoinConversation { conversation_id });
            }
            Command::Leave(conversation_id) => {
                if self.joined == Some(conversation_id) {
                    self.joined = None;
                }
                self.send_if_open(ClientEvent::LeaveConversation { conversation_id });
            }
        }
    }

    fn handle_internal(&mut self, internal: Internal, tx: &mpsc::UnboundedSender<Internal>) {
        match internal {
            Internal::ConnectOutcome(Ok(transport)) => {
                self.last_error.send_replace(None);
                self.install_transport(transport, tx);
                self.apply(ConnectionEvent::ConnectSucceeded, tx);
                // Room membership does not survive the server dropping the
                // old session, so rejoin the active conversation.
                if let Some(conversation_id) = self.joined {
                    self.send_if_open(ClientEvent::JoinConversation { conversation_id });
                }
            }
            Internal::ConnectOutcome(Err(e)) => {
                self.last_error.send_replace(Some(e.to_string()));
                if matches!(e, ClientError::Authentication(_)) {
                    // A bad credential never fixes itself by retrying.
                    tracing::error!("[Session] {}", e);
                    let _ = self.events.send(ServerEvent::error(e.to_string()));
                    self.apply(ConnectionEvent::ClientDisconnect, tx);
                } else {
                    tracing::warn!("[Session] Connect attempt failed: {}", e);
                    self.apply(ConnectionEvent::ConnectFailed, tx);
                }
            }
            Internal::RetryFired => self.apply(ConnectionEvent::RetryElapsed, tx),
            Internal::RemoteClosed(detail) => {
                tracing::warn!("[Session] Connection lost: {}", detail);
                self.last_error.send_replace(Some(detail));
                self.slot.replace(None);
                self.apply(ConnectionEvent::RemoteDisconnect, tx);
            }
        }
    }

    fn apply(&mut self, event: ConnectionEvent, internal: &mpsc::UnboundedSender<Internal>) {
        let effects = self.machine.apply(event);
        let _ = self.status.send(self.machine.status());
        for effect in effects {
            self.execute(effect, internal);
        }
    }

    fn execute(&mut self, effect: Effect, internal: &mpsc::UnboundedSender<Internal>) {
        match effect {
            Effect::AttemptConnect => {
                let ws_url = self.config.ws_url.clone();
                let token = self.config.token.clone();
                let handshake_timeout = self.config.handshake_timeout;
                let tx = internal.clone();
                tokio::spawn(async move {
                    let outcome = Transport::connect(&ws_url, &token, handshake_timeout).await;
                    let _ = tx.send(Internal::ConnectOutcome(outcome));
                });
            }
            Effect::ScheduleRetry { delay } => {
                tracing::info!("[Session] Retrying in {:?}", delay);
                let tx = internal.clone();
                self.cancel_retry();
                self.retry_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Internal::RetryFired);
                }));
            }
            Effect::CancelRetry => self.cancel_retry(),
            Effect::ReportFailed => {
                tracing::error!("[Session] Giving up after repeated connect failures");
            }
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn send_if_open(&self, event: ClientEvent) {
        if self.slot.is_connected() {
            if let Err(e) = self.slot.send_event(event) {
                tracing::warn!("[Session] Failed to queue event: {}", e);
            }
        }
    }

    fn install_transport(&mut self, transport: Transport, internal: &mpsc::UnboundedSender<Internal>) {
        let mut incoming = transport.subscribe();
        let mut closed = transport.closed();
        let events = self.events.clone();
        let state = self.state.clone();
        let tx = internal.clone();

        // Per-transport forwarder: mirrors server events into local state
        // and republishes them on the session-level channel.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = incoming.recv() => {
                        match event {
                            Ok(event) => {
                                apply_to_state(&state, &event);
                                let _ = events.send(event);
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("[Session] Dropped {} server events", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    changed = closed.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let reason = closed.borrow().clone();
                        match reason {
                            Some(DisconnectReason::Remote(detail)) => {
                                let _ = tx.send(Internal::RemoteClosed(detail));
                                break;
                            }
                            Some(DisconnectReason::ClientInitiated) => break,
                            None => continue,
                        }
                    }
                }
            }
        });

        if let Some(old) = self.slot.replace(Some(transport)) {
            old.disconnect();
        }
    }
}

fn apply_to_state(state: &Arc<Mutex<ConversationState>>, event: &ServerEvent) {
    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match event {
        ServerEvent::BotTyping => guard.set_typing(true),
        ServerEvent::BotStoppedTyping => guard.set_typing(false),
        ServerEvent::BotMessage { message } => guard.apply_bot_message(message.clone()),
        ServerEvent::MessageSent { message } => guard.reconcile(message.clone()),
        _ => {}
    }
}
