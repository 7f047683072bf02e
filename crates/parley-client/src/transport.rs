//! WebSocket transport for the client.
//!
//! [`spawn`] moves a [`ChatClient`] onto a tokio task that owns it for its
//! whole life. Everything else talks to that task through a cloneable
//! [`ChatHandle`]: commands go over an `mpsc` channel with `oneshot` replies,
//! connection state is published on a `watch` channel. Protocol logic stays
//! in the Sans-IO client; this module only moves bytes and time.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_core::{Handler, TransportConfig, env::Environment};
use parley_proto::{FrameDecoder, Inbound, destination::ENDPOINT_PATH};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::{
    ChatClient, ClientAction, ClientError, ClientEvent, Payload, RoomId, SocketId,
    SubscriptionToken, SystemEnv, TopicKey, TransportState,
};

/// Default REST/WebSocket origin.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default interval between maintenance ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

const COMMAND_CAPACITY: usize = 64;
const NOTICE_CAPACITY: usize = 16;

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// HTTP origin of the chat server, e.g. `http://localhost:8080`
    pub base_url: String,
    /// STOMP endpoint path under the origin
    pub endpoint_path: String,
    /// Endpoint is SockJS-wrapped; connect to its raw `/websocket` transport
    pub sockjs: bool,
    /// How often the driver ticks the client
    pub tick_interval: Duration,
    /// Session settings. `url` and `host` are derived from `base_url`.
    pub transport: TransportConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint_path: ENDPOINT_PATH.to_string(),
            sockjs: true,
            tick_interval: DEFAULT_TICK_INTERVAL,
            transport: TransportConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Default configuration against `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// WebSocket URL of the STOMP endpoint.
    ///
    /// `http` maps to `ws` and `https` to `wss`. A SockJS endpoint is reached
    /// through its `/websocket` sub-path.
    pub fn websocket_url(&self) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::InvalidEndpoint(format!("unsupported scheme {other}")));
            },
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::InvalidEndpoint(format!("cannot use scheme {scheme}")))?;

        let base = url.path().trim_end_matches('/').to_string();
        let endpoint = self.endpoint_path.trim_matches('/');
        let suffix = if self.sockjs { "/websocket" } else { "" };
        url.set_path(&format!("{base}/{endpoint}{suffix}"));
        url.set_query(None);
        Ok(url)
    }

    /// Session configuration with endpoint fields filled in.
    pub fn transport_config(&self) -> Result<TransportConfig, ClientError> {
        let url = self.websocket_url()?;
        let mut transport = self.transport.clone();
        transport.host = url.host_str().unwrap_or("localhost").to_string();
        transport.url = url.into();
        Ok(transport)
    }
}

/// Out-of-band broker notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Broker answered the liveness probe
    Liveness(Payload),
    /// Broker sent an ERROR frame; a reconnect follows
    BrokerError(String),
}

enum Command {
    Connect { credential: String, reply: oneshot::Sender<Result<(), ClientError>> },
    Disconnect { reply: oneshot::Sender<()> },
    Subscribe { topic: TopicKey, handler: Handler, reply: oneshot::Sender<SubscriptionToken> },
    Unsubscribe { token: SubscriptionToken, reply: oneshot::Sender<bool> },
    SendRoomMessage { room: RoomId, content: String, reply: oneshot::Sender<bool> },
    Publish { destination: String, body: String, reply: oneshot::Sender<bool> },
    Shutdown,
}

/// Shared handle to the client task.
///
/// Cheap to clone; every subscriber in the application holds one and they
/// all share the single broker connection.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<TransportState>,
    notices: broadcast::Sender<Notice>,
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle").field("state", &self.state()).finish_non_exhaustive()
    }
}

impl ChatHandle {
    /// Start connecting with a bearer token. Returns once the attempt began,
    /// not once the handshake finished; see [`ChatHandle::wait_for`].
    pub async fn connect(&self, credential: &str) -> Result<(), ClientError> {
        let credential = credential.to_string();
        self.request(|reply| Command::Connect { credential, reply }).await?
    }

    /// Close the connection and drop every subscription.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Register `handler` on `topic`.
    pub async fn subscribe(
        &self,
        topic: TopicKey,
        handler: Handler,
    ) -> Result<SubscriptionToken, ClientError> {
        self.request(|reply| Command::Subscribe { topic, handler, reply }).await
    }

    /// Subscribe to new messages in `room`.
    pub async fn subscribe_room(
        &self,
        room: RoomId,
        handler: Handler,
    ) -> Result<SubscriptionToken, ClientError> {
        self.subscribe(TopicKey::Room(room), handler).await
    }

    /// Subscribe to read receipts in `room`.
    pub async fn subscribe_room_read(
        &self,
        room: RoomId,
        handler: Handler,
    ) -> Result<SubscriptionToken, ClientError> {
        self.subscribe(TopicKey::RoomRead(room), handler).await
    }

    /// Subscribe to room list change notifications.
    pub async fn subscribe_rooms(&self, handler: Handler) -> Result<SubscriptionToken, ClientError> {
        self.subscribe(TopicKey::RoomsIndex, handler).await
    }

    /// Remove one handler. False if the token was already used.
    pub async fn unsubscribe(&self, token: SubscriptionToken) -> Result<bool, ClientError> {
        self.request(|reply| Command::Unsubscribe { token, reply }).await
    }

    /// Publish a chat message. False if empty or not connected.
    pub async fn send_room_message(&self, room: RoomId, content: &str) -> Result<bool, ClientError> {
        let content = content.to_string();
        self.request(|reply| Command::SendRoomMessage { room, content, reply }).await
    }

    /// Publish a JSON body to `destination`. False if not connected.
    pub async fn publish(&self, destination: &str, body: String) -> Result<bool, ClientError> {
        let destination = destination.to_string();
        self.request(|reply| Command::Publish { destination, body, reply }).await
    }

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        *self.status.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.status.clone()
    }

    /// Wait until the connection reaches `state`.
    pub async fn wait_for(&self, state: TransportState) -> Result<(), ClientError> {
        let mut status = self.status.clone();
        status.wait_for(|s| *s == state).await.map_err(|_| ClientError::Closed)?;
        Ok(())
    }

    /// Subscribe to broker notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stop the client task. Closes the socket without reconnecting.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }
}

/// Spawn the client task on the current tokio runtime using system time.
pub fn spawn(config: &ChatConfig) -> Result<(ChatHandle, JoinHandle<()>), ClientError> {
    spawn_with_env(config, SystemEnv::new())
}

/// Spawn the client task with a custom environment.
pub fn spawn_with_env<E: Environment>(
    config: &ChatConfig,
    env: E,
) -> Result<(ChatHandle, JoinHandle<()>), ClientError> {
    let transport = config.transport_config()?;
    tracing::debug!(url = %transport.url, "chat client starting");

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (status_tx, status_rx) = watch::channel(TransportState::Disconnected);
    let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        env,
        client: ChatClient::new(transport),
        status: status_tx,
        notices: notices_tx.clone(),
        events: events_tx,
        sockets: HashMap::new(),
        current: None,
        decoder: FrameDecoder::new(),
    };
    let task = tokio::spawn(driver.run(commands_rx, events_rx, config.tick_interval));

    let handle = ChatHandle { commands: commands_tx, status: status_rx, notices: notices_tx };
    Ok((handle, task))
}

enum Outgoing {
    Text(String),
    Close(String),
}

enum SocketEvent {
    Opened(SocketId),
    Data(SocketId, Vec<u8>),
    Closed(SocketId, String),
}

struct Driver<E: Environment> {
    env: E,
    client: ChatClient<E::Instant>,
    status: watch::Sender<TransportState>,
    notices: broadcast::Sender<Notice>,
    events: mpsc::UnboundedSender<SocketEvent>,
    /// Write side of every socket task still running
    sockets: HashMap<SocketId, mpsc::UnboundedSender<Outgoing>>,
    /// Socket that outgoing frames go to
    current: Option<SocketId>,
    decoder: FrameDecoder,
}

impl<E: Environment> Driver<E> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
        tick_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = events.recv() => self.on_socket(event),
                _ = ticker.tick() => self.handle(ClientEvent::Tick),
            }
        }

        let now = self.env.now();
        self.client.disconnect(now);
        self.flush();
        tracing::debug!("chat client stopped");
    }

    /// Run one command. Resulting actions execute before the caller hears
    /// back, so a reply always observes the new state.
    fn on_command(&mut self, command: Command) {
        let now = self.env.now();
        match command {
            Command::Connect { credential, reply } => {
                let result = self.client.connect(&credential, now);
                self.flush();
                let _ = reply.send(result);
            },
            Command::Disconnect { reply } => {
                self.client.disconnect(now);
                self.flush();
                let _ = reply.send(());
            },
            Command::Subscribe { topic, handler, reply } => {
                let token = self.client.subscribe(topic, handler, now);
                self.flush();
                let _ = reply.send(token);
            },
            Command::Unsubscribe { token, reply } => {
                let removed = self.client.unsubscribe(token, now);
                self.flush();
                let _ = reply.send(removed);
            },
            Command::SendRoomMessage { room, content, reply } => {
                let sent = self.client.send_room_message(room, &content, now);
                self.flush();
                let _ = reply.send(sent);
            },
            Command::Publish { destination, body, reply } => {
                let sent = self.client.publish(&destination, body, now);
                self.flush();
                let _ = reply.send(sent);
            },
            // handled by the run loop
            Command::Shutdown => {},
        }
    }

    fn flush(&mut self) {
        let actions = self.client.take_actions();
        self.execute(actions);
    }

    fn on_socket(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened(socket) => {
                // a late open from an abandoned attempt must not touch the decoder
                if self.current != Some(socket) {
                    tracing::debug!(%socket, "stale socket opened");
                    return;
                }
                self.decoder.reset();
                self.handle(ClientEvent::SocketOpened { socket });
            },
            SocketEvent::Data(socket, data) => {
                if self.current != Some(socket) {
                    return;
                }
                self.decoder.push(&data);
                loop {
                    match self.decoder.next_item() {
                        Ok(Some(Inbound::Heartbeat)) => self.handle(ClientEvent::HeartbeatReceived),
                        Ok(Some(Inbound::Frame(frame))) => {
                            self.handle(ClientEvent::FrameReceived(frame));
                        },
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(%socket, error = %e, "undecodable data; dropping socket");
                            self.close_socket(socket, "protocol error".to_string());
                            self.handle(ClientEvent::SocketClosed { socket, reason: e.to_string() });
                            break;
                        },
                    }
                }
            },
            SocketEvent::Closed(socket, reason) => {
                self.sockets.remove(&socket);
                if self.current == Some(socket) {
                    self.current = None;
                }
                self.handle(ClientEvent::SocketClosed { socket, reason });
            },
        }
    }

    fn handle(&mut self, event: ClientEvent) {
        let now = self.env.now();
        match self.client.handle(event, now) {
            Ok(actions) => self.execute(actions),
            Err(e) => {
                tracing::warn!(error = %e, "client rejected event");
                self.flush();
            },
        }
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::OpenSocket { socket, url } => self.open_socket(socket, url),
                ClientAction::Send(frame) => match frame.to_text() {
                    Ok(text) => self.write(Outgoing::Text(text)),
                    Err(e) => tracing::warn!(command = %frame.command, error = %e, "frame not sent"),
                },
                ClientAction::SendHeartbeat => self.write(Outgoing::Text("\n".to_string())),
                ClientAction::CloseSocket { socket, reason } => self.close_socket(socket, reason),
                ClientAction::ScheduleWakeup { after } => {
                    tracing::trace!(?after, "wakeup covered by ticker");
                },
                ClientAction::StatusChanged(state) => {
                    self.status.send_replace(state);
                },
                ClientAction::LivenessReply(payload) => {
                    let _ = self.notices.send(Notice::Liveness(payload));
                },
                ClientAction::BrokerError { message } => {
                    let _ = self.notices.send(Notice::BrokerError(message));
                },
            }
        }
    }

    fn open_socket(&mut self, socket: SocketId, url: String) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.insert(socket, tx);
        self.current = Some(socket);
        tokio::spawn(run_socket(socket, url, rx, self.events.clone()));
    }

    fn close_socket(&mut self, socket: SocketId, reason: String) {
        if let Some(link) = self.sockets.remove(&socket) {
            let _ = link.send(Outgoing::Close(reason));
        }
        if self.current == Some(socket) {
            self.current = None;
        }
    }

    fn write(&mut self, outgoing: Outgoing) {
        let Some(link) = self.current.and_then(|socket| self.sockets.get(&socket)) else {
            tracing::debug!("no open socket; write dropped");
            return;
        };
        let _ = link.send(outgoing);
    }
}

/// Own one WebSocket from open to close.
async fn run_socket(
    socket: SocketId,
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%socket, error = %e, "socket failed to open");
            let _ = events.send(SocketEvent::Closed(socket, e.to_string()));
            return;
        },
    };
    let _ = events.send(SocketEvent::Opened(socket));

    let (mut sink, mut stream) = stream.split();
    let reason = loop {
        tokio::select! {
            out = outgoing.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break e.to_string();
                    }
                },
                Some(Outgoing::Close(reason)) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break reason;
                },
                None => {
                    let _ = sink.close().await;
                    break "client dropped".to_string();
                },
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Data(socket, text.as_str().as_bytes().to_vec()));
                },
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(SocketEvent::Data(socket, data.to_vec()));
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(|| "closed by peer".to_string(), |f| f.reason.to_string());
                },
                // ping/pong answered by tungstenite
                Some(Ok(_)) => {},
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(%socket, %reason, "socket closed");
    let _ = events.send(SocketEvent::Closed(socket, reason));
}

#[cfg(test)]
mod tests {
    use parley_proto::Frame;

    use super::*;

    fn driver() -> (Driver<SystemEnv>, watch::Receiver<TransportState>) {
        let (status, status_rx) = watch::channel(TransportState::Disconnected);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (events, _) = mpsc::unbounded_channel();
        let config = TransportConfig { liveness_probe: false, ..TransportConfig::default() };
        let driver = Driver {
            env: SystemEnv::new(),
            client: ChatClient::new(config),
            status,
            notices,
            events,
            sockets: HashMap::new(),
            current: None,
            decoder: FrameDecoder::new(),
        };
        (driver, status_rx)
    }

    #[test]
    fn stale_open_keeps_partial_frame() {
        let (mut driver, status) = driver();
        let now = driver.env.now();
        driver.client.connect("token", now).unwrap();
        let socket = driver
            .client
            .take_actions()
            .into_iter()
            .find_map(|action| match action {
                ClientAction::OpenSocket { socket, .. } => Some(socket),
                _ => None,
            })
            .unwrap();

        // stand in for the socket task
        let (link, mut written) = mpsc::unbounded_channel();
        driver.sockets.insert(socket, link);
        driver.current = Some(socket);
        driver.on_socket(SocketEvent::Opened(socket));
        assert!(matches!(written.try_recv(), Ok(Outgoing::Text(text)) if text.starts_with("CONNECT")));

        let reply = Frame::connected("s-1", (0, 0)).to_bytes().unwrap();
        let (head, tail) = reply.split_at(reply.len() / 2);
        driver.on_socket(SocketEvent::Data(socket, head.to_vec()));
        driver.on_socket(SocketEvent::Opened(SocketId(socket.0 + 100)));
        driver.on_socket(SocketEvent::Data(socket, tail.to_vec()));

        assert_eq!(driver.client.state(), TransportState::Connected);
        assert_eq!(*status.borrow(), TransportState::Connected);
        assert_eq!(driver.current, Some(socket));
    }

    #[test]
    fn sockjs_endpoint_url() {
        let config = ChatConfig::default();
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://localhost:8080/ws-chat/websocket"
        );
    }

    #[test]
    fn https_maps_to_wss_and_keeps_prefix() {
        let config = ChatConfig {
            sockjs: false,
            ..ChatConfig::with_base_url("https://chat.example.com/app/")
        };
        assert_eq!(config.websocket_url().unwrap().as_str(), "wss://chat.example.com/app/ws-chat");
    }

    #[test]
    fn transport_config_takes_host_from_origin() {
        let config = ChatConfig::with_base_url("http://10.0.0.7:9000");
        let transport = config.transport_config().unwrap();
        assert_eq!(transport.host, "10.0.0.7");
        assert_eq!(transport.url, "ws://10.0.0.7:9000/ws-chat/websocket");
    }

    #[test]
    fn rejects_unusable_origin() {
        assert!(matches!(
            ChatConfig::with_base_url("ftp://example.com").websocket_url(),
            Err(ClientError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            ChatConfig::with_base_url("not a url").websocket_url(),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }
}
