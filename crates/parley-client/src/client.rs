//! Chat client state machine.
//!
//! [`ChatClient`] owns the transport session and the subscription registry
//! and keeps them consistent: every connection transition reconciles the
//! registry, and every subscribe or unsubscribe reconciles its own topic.
//! Subscribers never see the transport; they register handlers and keep the
//! returned token.
//!
//! All work happens synchronously inside one call. Actions accumulate in an
//! outgoing queue that the driver drains with [`ChatClient::take_actions`].

use std::{mem, ops::Sub, time::Duration};

use parley_core::{
    Handler, ReconcileOp, SubscriptionRegistry, SubscriptionToken, TransportAction,
    TransportConfig, TransportEvent, TransportSession, TransportState, TransportStep,
    reconcile_all, reconcile_topic, transport::LIVENESS_SUBSCRIPTION,
};
use parley_proto::{
    Command, Frame, Payload, RoomId, TopicKey, destination::CHAT_SEND_DESTINATION,
    payloads::chat::OutboundChatMessage,
};

use crate::{ClientAction, ClientError, ClientEvent};

/// Connection manager combining session, registry and publish facade.
///
/// Generic over `Instant` so the same client runs on real and virtual time.
pub struct ChatClient<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    transport: TransportSession<I>,
    registry: SubscriptionRegistry,
    /// Actions not yet taken by the driver
    outgoing: Vec<ClientAction>,
    /// Last state announced through [`ClientAction::StatusChanged`]
    reported: TransportState,
}

impl<I> ChatClient<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a disconnected client.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            transport: TransportSession::new(config),
            registry: SubscriptionRegistry::new(),
            outgoing: Vec::new(),
            reported: TransportState::Disconnected,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Whether the broker session is established.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Subscription registry (read-only).
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Transport session (read-only).
    pub fn transport(&self) -> &TransportSession<I> {
        &self.transport
    }

    /// Drain queued actions.
    pub fn take_actions(&mut self) -> Vec<ClientAction> {
        mem::take(&mut self.outgoing)
    }

    /// Start connecting with a bearer credential.
    ///
    /// No-op while already connecting or connected.
    ///
    /// # Errors
    ///
    /// - `SessionError::MissingCredential` if the credential is blank
    pub fn connect(&mut self, credential: &str, now: I) -> Result<(), ClientError> {
        let step = self.transport.connect(credential, now)?;
        self.apply(step, now);
        Ok(())
    }

    /// Close the connection and drop every subscription, desired or live.
    ///
    /// Idempotent. No reconnect follows.
    pub fn disconnect(&mut self, now: I) {
        let dropped = self.registry.clear();
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "subscriptions dropped by disconnect");
        }
        let step = self.transport.disconnect();
        self.apply(step, now);
    }

    /// Register `handler` on `topic`.
    ///
    /// If connected and the topic had no live subscription, one is
    /// established immediately. Otherwise the intent waits for the next
    /// connect.
    pub fn subscribe(&mut self, topic: TopicKey, handler: Handler, now: I) -> SubscriptionToken {
        let token = self.registry.add(topic, handler);
        self.reconcile(topic, now);
        token
    }

    /// Subscribe to new messages in `room`.
    pub fn subscribe_room(&mut self, room: RoomId, handler: Handler, now: I) -> SubscriptionToken {
        self.subscribe(TopicKey::Room(room), handler, now)
    }

    /// Subscribe to read receipts in `room`.
    pub fn subscribe_room_read(
        &mut self,
        room: RoomId,
        handler: Handler,
        now: I,
    ) -> SubscriptionToken {
        self.subscribe(TopicKey::RoomRead(room), handler, now)
    }

    /// Subscribe to room list change notifications.
    pub fn subscribe_rooms(&mut self, handler: Handler, now: I) -> SubscriptionToken {
        self.subscribe(TopicKey::RoomsIndex, handler, now)
    }

    /// Remove the handler behind `token`.
    ///
    /// When it was the topic's last handler the live subscription is
    /// released. Returns false if the token was already used or a disconnect
    /// dropped it.
    pub fn unsubscribe(&mut self, token: SubscriptionToken, now: I) -> bool {
        let removed = self.registry.remove(token);
        self.reconcile(token.topic(), now);
        removed
    }

    /// Publish a chat message to `room`.
    ///
    /// Returns false without side effects if the trimmed content is empty or
    /// the session is not connected. Fire-and-forget: `true` means the frame
    /// was queued, not that the broker accepted it.
    pub fn send_room_message(&mut self, room: RoomId, content: &str, now: I) -> bool {
        let Some(message) = OutboundChatMessage::new(room, content) else {
            tracing::debug!(room_id = room, "empty message not sent");
            return false;
        };
        if !self.is_connected() {
            tracing::warn!(room_id = room, "message not sent; socket disconnected");
            return false;
        }
        let body = match message.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(room_id = room, error = %e, "message not serializable");
                return false;
            },
        };
        self.publish(CHAT_SEND_DESTINATION, body, now)
    }

    /// Publish a JSON body to an arbitrary destination. False if not
    /// connected.
    pub fn publish(&mut self, destination: &str, body: String, now: I) -> bool {
        match self.transport.publish(destination, body, Some("application/json"), now) {
            Some(action) => {
                self.push_transport_action(action);
                true
            },
            None => false,
        }
    }

    /// Process a driver event and return every queued action.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnexpectedFrame` for control frames that make no
    ///   sense in the current state. The client state is unchanged.
    pub fn handle(&mut self, event: ClientEvent, now: I) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::SocketOpened { socket } => {
                let step = self.transport.socket_opened(socket, now)?;
                self.apply(step, now);
            },
            ClientEvent::SocketClosed { socket, reason } => {
                let step = self.transport.socket_closed(socket, &reason, now);
                self.apply(step, now);
            },
            ClientEvent::HeartbeatReceived => self.transport.record_activity(now),
            ClientEvent::FrameReceived(frame) if frame.command == Command::Message => {
                self.transport.record_activity(now);
                self.deliver(&frame);
            },
            ClientEvent::FrameReceived(frame) => {
                let step = self.transport.handle_frame(&frame, now)?;
                self.apply(step, now);
            },
            ClientEvent::Tick => {
                let step = self.transport.tick(now);
                self.apply(step, now);
            },
        }
        Ok(self.take_actions())
    }

    /// Route a MESSAGE frame to its handlers.
    fn deliver(&mut self, frame: &Frame) {
        if !self.is_connected() {
            tracing::debug!("message before handshake dropped");
            return;
        }
        let Some(subscription) = frame.subscription() else {
            tracing::warn!("message without subscription header dropped");
            return;
        };

        let payload = Payload::from_frame(frame);
        if subscription == LIVENESS_SUBSCRIPTION {
            self.outgoing.push(ClientAction::LivenessReply(payload));
            return;
        }

        if let Some((topic, report)) = self.registry.route(subscription, &payload) {
            tracing::trace!(%topic, delivered = report.delivered, failed = report.failed, "dispatched");
        }
    }

    /// Restore the live/desired invariant for one topic.
    fn reconcile(&mut self, topic: TopicKey, now: I) {
        let connected = self.is_connected();
        if let Some(op) = reconcile_topic(&mut self.registry, topic, connected) {
            self.send_op(&op, now);
        }
    }

    fn send_op(&mut self, op: &ReconcileOp, now: I) {
        if let Some(action) = self.transport.send(op.to_frame(), now) {
            self.push_transport_action(action);
        }
    }

    /// Execute a transport step: forward actions, react to events.
    fn apply(&mut self, step: TransportStep, now: I) {
        for action in step.actions {
            self.push_transport_action(action);
        }

        for event in step.events {
            match event {
                TransportEvent::Connected { .. } => {
                    let ops = reconcile_all(&mut self.registry, true);
                    tracing::debug!(count = ops.len(), "subscriptions restored");
                    for op in &ops {
                        self.send_op(op, now);
                    }
                },
                TransportEvent::Disconnected { reason } => {
                    // the broker forgot the dead socket's subscriptions
                    let released = reconcile_all(&mut self.registry, false);
                    tracing::debug!(%reason, released = released.len(), "live subscriptions dropped");
                },
                TransportEvent::Error { message } => {
                    self.outgoing.push(ClientAction::BrokerError { message });
                },
            }
        }

        let state = self.transport.state();
        if state != self.reported {
            self.reported = state;
            self.outgoing.push(ClientAction::StatusChanged(state));
        }
    }

    fn push_transport_action(&mut self, action: TransportAction) {
        self.outgoing.push(match action {
            TransportAction::OpenSocket { socket, url } => ClientAction::OpenSocket { socket, url },
            TransportAction::Send(frame) => ClientAction::Send(frame),
            TransportAction::SendHeartbeat => ClientAction::SendHeartbeat,
            TransportAction::CloseSocket { socket, reason } => {
                ClientAction::CloseSocket { socket, reason }
            },
            TransportAction::ScheduleReconnect { after } => ClientAction::ScheduleWakeup { after },
        });
    }
}

impl<I> std::fmt::Debug for ChatClient<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.transport.state())
            .field("registry", &self.registry)
            .field("queued", &self.outgoing.len())
            .finish()
    }
}
