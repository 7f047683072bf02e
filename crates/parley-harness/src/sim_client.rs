//! Simulated chat client.
//!
//! `SimClient` drives a real [`ChatClient`] against a [`SimBroker`] on a
//! virtual clock. It executes the client's actions the way the WebSocket
//! driver does, except that bytes travel through memory: every frame is
//! encoded, split into small chunks and decoded again on both sides, so the
//! codec is exercised too.
//!
//! Network faults are explicit: [`SimClient::drop_connection`] kills the
//! socket, [`SimClient::set_reachable`] makes new sockets fail to open.

use std::{collections::VecDeque, time::Duration};

use parley_client::{ChatClient, ClientAction, ClientError, ClientEvent, TransportConfig};
use parley_core::{
    Handler, SocketId, SubscriptionRegistry, SubscriptionToken, TransportState, env::Environment,
};
use parley_proto::{Frame, FrameDecoder, Inbound, RoomId, TopicKey};

use crate::{
    sim_broker::{ConnectionId, SharedBroker, lock_broker},
    sim_env::{SimEnv, SimInstant},
};

/// Bytes handed to the decoder per push.
const CHUNK_SIZE: usize = 7;

/// Rounds of action execution per pump before giving up.
const MAX_PUMP_ROUNDS: usize = 10_000;

/// Chat client wired to an in-process broker.
pub struct SimClient {
    client: ChatClient<SimInstant>,
    env: SimEnv,
    broker: SharedBroker,
    /// Open socket and its broker connection
    connection: Option<(SocketId, ConnectionId)>,
    reachable: bool,
    decoder: FrameDecoder,
    pending: VecDeque<ClientAction>,
    statuses: Vec<TransportState>,
    broker_errors: Vec<String>,
    liveness_replies: usize,
    heartbeats_sent: usize,
    sockets_opened: usize,
    wakeup: Option<SimInstant>,
}

impl SimClient {
    /// Client on `env`'s clock talking to `broker`.
    pub fn new(env: SimEnv, broker: SharedBroker, config: TransportConfig) -> Self {
        Self {
            client: ChatClient::new(config),
            env,
            broker,
            connection: None,
            reachable: true,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            statuses: Vec::new(),
            broker_errors: Vec::new(),
            liveness_replies: 0,
            heartbeats_sent: 0,
            sockets_opened: 0,
            wakeup: None,
        }
    }

    /// Start connecting.
    pub fn connect(&mut self, credential: &str) -> Result<(), ClientError> {
        let now = self.env.now();
        self.client.connect(credential, now)?;
        self.pump();
        Ok(())
    }

    /// Full teardown.
    pub fn disconnect(&mut self) {
        let now = self.env.now();
        self.client.disconnect(now);
        self.pump();
    }

    /// Register a handler.
    pub fn subscribe(&mut self, topic: TopicKey, handler: Handler) -> SubscriptionToken {
        let now = self.env.now();
        let token = self.client.subscribe(topic, handler, now);
        self.pump();
        token
    }

    /// Remove a handler.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let now = self.env.now();
        let removed = self.client.unsubscribe(token, now);
        self.pump();
        removed
    }

    /// Publish a chat message.
    pub fn send_room_message(&mut self, room: RoomId, content: &str) -> bool {
        let now = self.env.now();
        let sent = self.client.send_room_message(room, content, now);
        self.pump();
        sent
    }

    /// Kill the socket as a network failure would.
    pub fn drop_connection(&mut self) {
        let Some((socket, connection)) = self.connection.take() else {
            return;
        };
        lock_broker(&self.broker).close(connection);
        self.feed(ClientEvent::SocketClosed { socket, reason: "connection reset".to_string() });
        self.pump();
    }

    /// Whether new sockets can reach the broker.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Move the clock forward and tick the client once.
    pub fn advance(&mut self, duration: Duration) {
        self.env.advance(duration);
        self.feed(ClientEvent::Tick);
        self.pump();
    }

    /// Advance in `step` increments until `total` has passed.
    pub fn run_for(&mut self, total: Duration, step: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.advance(step);
            elapsed += step;
        }
    }

    /// Execute queued actions and deliver broker output until both are
    /// exhausted.
    pub fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            self.pending.extend(self.client.take_actions());
            if let Some(action) = self.pending.pop_front() {
                self.execute(action);
                continue;
            }
            if !self.deliver_inbound() {
                return;
            }
        }
        tracing::warn!("pump did not settle");
    }

    /// Connection state.
    pub fn state(&self) -> TransportState {
        self.client.state()
    }

    /// Registry of the underlying client.
    pub fn registry(&self) -> &SubscriptionRegistry {
        self.client.registry()
    }

    /// Broker connection of the open socket.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection.map(|(_, connection)| connection)
    }

    /// Shared broker.
    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    /// Virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Every state change reported by the client, in order.
    pub fn statuses(&self) -> &[TransportState] {
        &self.statuses
    }

    /// Broker `ERROR` messages seen.
    pub fn broker_errors(&self) -> &[String] {
        &self.broker_errors
    }

    /// Liveness probe answers received.
    pub fn liveness_replies(&self) -> usize {
        self.liveness_replies
    }

    /// Heartbeats written.
    pub fn heartbeats_sent(&self) -> usize {
        self.heartbeats_sent
    }

    /// Sockets the client asked to open.
    pub fn sockets_opened(&self) -> usize {
        self.sockets_opened
    }

    /// Time of the wakeup the client last asked for.
    pub fn wakeup(&self) -> Option<SimInstant> {
        self.wakeup
    }

    fn feed(&mut self, event: ClientEvent) {
        let now = self.env.now();
        match self.client.handle(event, now) {
            Ok(actions) => self.pending.extend(actions),
            Err(e) => tracing::warn!(error = %e, "client rejected event"),
        }
    }

    fn execute(&mut self, action: ClientAction) {
        match action {
            ClientAction::OpenSocket { socket, .. } => {
                self.sockets_opened += 1;
                if let Some((_, stale)) = self.connection.take() {
                    lock_broker(&self.broker).close(stale);
                }
                if self.reachable {
                    let connection = lock_broker(&self.broker).open();
                    self.connection = Some((socket, connection));
                    self.decoder.reset();
                    self.feed(ClientEvent::SocketOpened { socket });
                } else {
                    let reason = "broker unreachable".to_string();
                    self.feed(ClientEvent::SocketClosed { socket, reason });
                }
            },
            ClientAction::Send(frame) => self.write(&frame),
            ClientAction::SendHeartbeat => self.heartbeats_sent += 1,
            ClientAction::CloseSocket { socket, .. } => {
                if let Some((open, connection)) = self.connection
                    && open == socket
                {
                    lock_broker(&self.broker).close(connection);
                    self.connection = None;
                }
            },
            ClientAction::ScheduleWakeup { after } => self.wakeup = Some(self.env.now() + after),
            ClientAction::StatusChanged(state) => self.statuses.push(state),
            ClientAction::LivenessReply(_) => self.liveness_replies += 1,
            ClientAction::BrokerError { message } => self.broker_errors.push(message),
        }
    }

    /// Client to broker, through the codec.
    fn write(&mut self, frame: &Frame) {
        let Some((_, connection)) = self.connection else {
            tracing::debug!(command = ?frame.command, "write without socket dropped");
            return;
        };
        match frame.to_bytes().and_then(|bytes| Frame::decode(&bytes)) {
            Ok(decoded) => lock_broker(&self.broker).receive(connection, &decoded),
            Err(e) => tracing::warn!(error = %e, "frame failed to round-trip"),
        }
    }

    /// Broker to client, in chunks. Returns whether anything arrived.
    fn deliver_inbound(&mut self) -> bool {
        let Some((socket, connection)) = self.connection else {
            return false;
        };
        let frames = lock_broker(&self.broker).take_outbox(connection);
        if frames.is_empty() {
            return false;
        }

        for frame in frames {
            let bytes = match frame.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "broker frame not encodable");
                    continue;
                },
            };
            for chunk in bytes.chunks(CHUNK_SIZE) {
                self.decoder.push(chunk);
            }
        }

        loop {
            match self.decoder.next_item() {
                Ok(Some(Inbound::Frame(frame))) => self.feed(ClientEvent::FrameReceived(frame)),
                Ok(Some(Inbound::Heartbeat)) => self.feed(ClientEvent::HeartbeatReceived),
                Ok(None) => break,
                Err(e) => {
                    let reason = e.to_string();
                    self.feed(ClientEvent::SocketClosed { socket, reason });
                    break;
                },
            }
        }
        true
    }
}

impl std::fmt::Debug for SimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimClient")
            .field("state", &self.client.state())
            .field("connection", &self.connection)
            .field("reachable", &self.reachable)
            .finish_non_exhaustive()
    }
}
