//! Transport session state machine.
//!
//! Owns the lifecycle of the single broker connection: opening a socket,
//! the STOMP handshake with bearer credentials, heartbeats in both
//! directions, and reconnecting after an unexpected loss. Uses the action
//! pattern: methods take time as input and return a [`TransportStep`] with
//! actions for the driver and events for the layer above.
//!
//! # State Machine
//!
//! ```text
//!                 connect()          CONNECTED
//! ┌──────────────┐ ───────> ┌────────────┐ ───────> ┌───────────┐
//! │ Disconnected │          │ Connecting │          │ Connected │
//! └──────────────┘ <─────── └────────────┘          └───────────┘
//!        ↑  │   timeout/close/ERROR                        │
//!        │  └─ reconnect_delay elapsed ─> Connecting       │
//!        └──────────── close/ERROR/heartbeat timeout ──────┘
//! ```
//!
//! `disconnect()` returns to `Disconnected` from any state and forgets the
//! credential, so no reconnect follows.

use std::{ops::Sub, time::Duration};

use bytes::Bytes;
use parley_proto::{Command, Frame, destination};

use crate::error::SessionError;

/// Delay before reconnecting after an unexpected loss.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Time allowed between opening the socket and receiving `CONNECTED`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Heartbeat interval offered in both directions.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Default WebSocket URL of the chat endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws-chat/websocket";

/// Subscription id reserved for the liveness probe.
///
/// Registry ids are `sub-{n}`, so this never collides.
pub const LIVENESS_SUBSCRIPTION: &str = "liveness";

/// Identifier of one socket attempt. Reports about older sockets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u64);

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No socket, or waiting to reconnect
    Disconnected,
    /// Socket opening or STOMP handshake in progress
    Connecting,
    /// Handshake complete; frames may be published
    Connected,
}

/// Actions the driver executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAction {
    /// Open a WebSocket to `url` and report back with `socket`
    OpenSocket {
        /// Attempt identifier
        socket: SocketId,
        /// Endpoint URL
        url: String,
    },
    /// Write this frame to the current socket
    Send(Frame),
    /// Write a bare end-of-line heartbeat
    SendHeartbeat,
    /// Close the socket
    CloseSocket {
        /// Socket to close
        socket: SocketId,
        /// Human-readable reason
        reason: String,
    },
    /// Make sure `tick` is called again after `after`
    ScheduleReconnect {
        /// Delay before the next attempt
        after: Duration,
    },
}

/// Notifications for the layer above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Connected {
        /// Broker `session` header, if any
        session: Option<String>,
    },
    /// Connection lost or closed
    Disconnected {
        /// Why the connection ended
        reason: String,
    },
    /// Broker reported an error
    Error {
        /// Broker message
        message: String,
    },
}

/// Output of one state machine call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStep {
    /// Work for the driver, in order
    pub actions: Vec<TransportAction>,
    /// State changes for the layer above, in order
    pub events: Vec<TransportEvent>,
}

impl TransportStep {
    /// Whether the step carries nothing.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.events.is_empty()
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the broker endpoint
    pub url: String,
    /// Value of the STOMP `host` header
    pub host: String,
    /// Fixed backoff before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Time allowed for the STOMP handshake
    pub handshake_timeout: Duration,
    /// Heartbeat interval we offer to send (zero disables)
    pub heartbeat_outgoing: Duration,
    /// Heartbeat interval we ask the broker to send (zero disables)
    pub heartbeat_incoming: Duration,
    /// Subscribe to the ping queue and publish one ping after connecting
    pub liveness_probe: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            host: "localhost".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            liveness_probe: true,
        }
    }
}

/// Heartbeat intervals agreed with the broker. `None` disables a direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeats {
    /// How often we must send something
    pub outgoing: Option<Duration>,
    /// How often the broker promised to send something
    pub incoming: Option<Duration>,
}

impl Heartbeats {
    /// STOMP 1.2 negotiation.
    ///
    /// `client` is what we offered in CONNECT, `server` what CONNECTED
    /// answered, both as `(cx, cy)` milliseconds.
    pub fn negotiate(client: (u64, u64), server: (u64, u64)) -> Self {
        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        Self { outgoing: pick(client.0, server.1), incoming: pick(client.1, server.0) }
    }
}

/// Transport session state machine.
///
/// Pure: no I/O, no clock. Generic over `Instant` so simulation can use
/// virtual time.
#[derive(Debug, Clone)]
pub struct TransportSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: TransportConfig,
    state: TransportState,
    /// Bearer token; `None` after an explicit disconnect
    credential: Option<String>,
    /// Current socket attempt
    socket: Option<SocketId>,
    /// Whether the current socket reported open (CONNECT sent)
    socket_open: bool,
    next_socket: u64,
    /// When the current attempt started
    attempt_started: Option<I>,
    /// When the connection was lost, if a reconnect is pending
    lost_at: Option<I>,
    last_received: Option<I>,
    last_sent: Option<I>,
    heartbeats: Heartbeats,
    session: Option<String>,
}

impl<I> TransportSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a session in [`TransportState::Disconnected`].
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: TransportState::Disconnected,
            credential: None,
            socket: None,
            socket_open: false,
            next_socket: 0,
            attempt_started: None,
            lost_at: None,
            last_received: None,
            last_sent: None,
            heartbeats: Heartbeats::default(),
            session: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Whether frames may be published.
    pub fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    /// Current socket attempt. `None` when no socket is open or opening.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Whether a reconnect is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.lost_at.is_some()
    }

    /// Heartbeat intervals agreed in the last handshake.
    pub fn heartbeats(&self) -> Heartbeats {
        self.heartbeats
    }

    /// Broker session id from the last handshake.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Start connecting with `credential`.
    ///
    /// No-op while Connecting or Connected. From Disconnected (including a
    /// pending reconnect) a new socket attempt starts immediately.
    ///
    /// # Errors
    ///
    /// - `SessionError::MissingCredential` if `credential` is blank. No state
    ///   changes.
    pub fn connect(&mut self, credential: &str, now: I) -> Result<TransportStep, SessionError> {
        let credential = credential.trim();
        if credential.is_empty() {
            tracing::warn!("no credential; skipping connect");
            return Err(SessionError::MissingCredential);
        }

        if self.state != TransportState::Disconnected {
            tracing::debug!(state = ?self.state, "connect ignored; already active");
            return Ok(TransportStep::default());
        }

        tracing::info!(url = %self.config.url, "connecting");
        self.credential = Some(credential.to_string());
        Ok(self.open_socket(now))
    }

    /// Driver reports that `socket` is open. Sends the STOMP handshake.
    pub fn socket_opened(&mut self, socket: SocketId, now: I) -> Result<TransportStep, SessionError> {
        if self.socket != Some(socket) {
            tracing::debug!(%socket, "ignoring open of stale socket");
            return Ok(TransportStep::default());
        }

        if self.state != TransportState::Connecting || self.socket_open {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "open socket",
            });
        }

        let Some(credential) = self.credential.as_deref() else {
            return Err(SessionError::MissingCredential);
        };

        self.socket_open = true;
        self.last_received = Some(now);
        self.last_sent = Some(now);

        let frame = Frame::connect(&self.config.host, credential, self.offered_heartbeats());
        Ok(TransportStep { actions: vec![TransportAction::Send(frame)], events: Vec::new() })
    }

    /// Driver reports that `socket` closed or failed.
    ///
    /// Closure of the current socket is treated as an unexpected loss and
    /// schedules a reconnect. Reports about older sockets are ignored.
    pub fn socket_closed(&mut self, socket: SocketId, reason: &str, now: I) -> TransportStep {
        if self.socket != Some(socket) {
            tracing::debug!(%socket, "ignoring close of stale socket");
            return TransportStep::default();
        }

        self.connection_lost(reason.to_string(), false, now)
    }

    /// Any inbound bytes, including heartbeats, prove the broker is alive.
    pub fn record_activity(&mut self, now: I) {
        self.last_received = Some(now);
    }

    /// Process a control frame (anything but `MESSAGE`).
    ///
    /// # Errors
    ///
    /// - `SessionError::UnexpectedFrame` if the frame is invalid for the
    ///   current state. The session is unchanged.
    pub fn handle_frame(&mut self, frame: &Frame, now: I) -> Result<TransportStep, SessionError> {
        self.last_received = Some(now);

        match (self.state, frame.command) {
            (TransportState::Connecting, Command::Connected) if self.socket_open => {
                self.state = TransportState::Connected;
                self.heartbeats = Heartbeats::negotiate(self.offered_heartbeats(), frame.heart_beat());
                self.session = frame.header("session").map(ToString::to_string);
                self.last_sent = Some(now);

                tracing::info!(
                    session = self.session.as_deref().unwrap_or("-"),
                    heartbeats = ?self.heartbeats,
                    "connected"
                );

                let mut step = TransportStep {
                    actions: Vec::new(),
                    events: vec![TransportEvent::Connected { session: self.session.clone() }],
                };
                if self.config.liveness_probe {
                    step.actions.push(TransportAction::Send(Frame::subscribe(
                        LIVENESS_SUBSCRIPTION,
                        destination::PING_QUEUE,
                    )));
                    step.actions.push(TransportAction::Send(Frame::send(
                        destination::PING_DESTINATION,
                        "",
                        None,
                    )));
                }
                Ok(step)
            },

            (TransportState::Connecting | TransportState::Connected, Command::Error) => {
                let message = frame
                    .header("message")
                    .map_or_else(|| frame.body_text().into_owned(), ToString::to_string);
                tracing::error!(%message, "broker error");

                let reason = SessionError::Broker(message.clone()).to_string();
                let mut step = self.connection_lost(reason, true, now);
                step.events.insert(0, TransportEvent::Error { message });
                Ok(step)
            },

            (TransportState::Connected, Command::Receipt) => Ok(TransportStep::default()),

            (state, command) => Err(SessionError::UnexpectedFrame { state, command }),
        }
    }

    /// Periodic maintenance: reconnect backoff, handshake timeout and
    /// heartbeats in both directions.
    pub fn tick(&mut self, now: I) -> TransportStep {
        match self.state {
            TransportState::Disconnected => {
                let Some(lost_at) = self.lost_at else {
                    return TransportStep::default();
                };
                if now - lost_at < self.config.reconnect_delay || self.credential.is_none() {
                    return TransportStep::default();
                }
                tracing::info!(url = %self.config.url, "reconnecting");
                self.open_socket(now)
            },

            TransportState::Connecting => {
                let elapsed = self.attempt_started.map_or(Duration::ZERO, |start| now - start);
                if elapsed <= self.config.handshake_timeout {
                    return TransportStep::default();
                }
                tracing::warn!(?elapsed, "handshake timed out");
                let reason = SessionError::HandshakeTimeout { elapsed }.to_string();
                self.connection_lost(reason, true, now)
            },

            TransportState::Connected => {
                if let Some(incoming) = self.heartbeats.incoming
                    && let Some(last) = self.last_received
                {
                    let elapsed = now - last;
                    if elapsed > incoming * 2 {
                        tracing::warn!(?elapsed, "broker heartbeat missed");
                        let reason = SessionError::HeartbeatTimeout { elapsed }.to_string();
                        return self.connection_lost(reason, true, now);
                    }
                }

                let mut step = TransportStep::default();
                if let Some(outgoing) = self.heartbeats.outgoing {
                    let due = self.last_sent.is_none_or(|last| now - last >= outgoing);
                    if due {
                        step.actions.push(TransportAction::SendHeartbeat);
                        self.last_sent = Some(now);
                    }
                }
                step
            },
        }
    }

    /// Queue `frame` for sending. `None` unless Connected.
    pub fn send(&mut self, frame: Frame, now: I) -> Option<TransportAction> {
        if self.state != TransportState::Connected {
            return None;
        }
        self.last_sent = Some(now);
        Some(TransportAction::Send(frame))
    }

    /// Publish `body` to `destination`. `None` unless Connected.
    pub fn publish(
        &mut self,
        destination: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
        now: I,
    ) -> Option<TransportAction> {
        if self.state != TransportState::Connected {
            tracing::warn!(destination, "publish skipped; not connected");
            return None;
        }
        let frame = Frame::send(destination, body, content_type);
        self.send(frame, now)
    }

    /// Close everything and forget the credential.
    ///
    /// Idempotent. Cancels any pending reconnect. Sends `DISCONNECT` first if
    /// the handshake had completed.
    pub fn disconnect(&mut self) -> TransportStep {
        let mut step = TransportStep::default();
        let was = self.state;

        if was == TransportState::Connected {
            step.actions.push(TransportAction::Send(Frame::disconnect()));
        }
        if let Some(socket) = self.socket.take() {
            step.actions.push(TransportAction::CloseSocket {
                socket,
                reason: "client disconnect".to_string(),
            });
        }
        if was != TransportState::Disconnected {
            step.events
                .push(TransportEvent::Disconnected { reason: "client disconnect".to_string() });
        }
        if was != TransportState::Disconnected || self.credential.is_some() {
            tracing::info!("disconnected by client");
        }

        self.state = TransportState::Disconnected;
        self.credential = None;
        self.socket_open = false;
        self.attempt_started = None;
        self.lost_at = None;
        self.session = None;
        self.heartbeats = Heartbeats::default();
        step
    }

    fn offered_heartbeats(&self) -> (u64, u64) {
        (
            self.config.heartbeat_outgoing.as_millis() as u64,
            self.config.heartbeat_incoming.as_millis() as u64,
        )
    }

    fn open_socket(&mut self, now: I) -> TransportStep {
        self.next_socket += 1;
        let socket = SocketId(self.next_socket);

        self.state = TransportState::Connecting;
        self.socket = Some(socket);
        self.socket_open = false;
        self.attempt_started = Some(now);
        self.lost_at = None;

        TransportStep {
            actions: vec![TransportAction::OpenSocket { socket, url: self.config.url.clone() }],
            events: Vec::new(),
        }
    }

    /// Unexpected loss: drop to Disconnected and schedule a reconnect.
    fn connection_lost(&mut self, reason: String, close_socket: bool, now: I) -> TransportStep {
        let mut step = TransportStep::default();

        if let Some(socket) = self.socket.take()
            && close_socket
        {
            step.actions.push(TransportAction::CloseSocket { socket, reason: reason.clone() });
        }

        tracing::info!(%reason, "connection lost");
        self.state = TransportState::Disconnected;
        self.socket_open = false;
        self.attempt_started = None;
        self.session = None;
        self.heartbeats = Heartbeats::default();
        step.events.push(TransportEvent::Disconnected { reason });

        if self.credential.is_some() {
            self.lost_at = Some(now);
            step.actions
                .push(TransportAction::ScheduleReconnect { after: self.config.reconnect_delay });
        }
        step
    }
}
