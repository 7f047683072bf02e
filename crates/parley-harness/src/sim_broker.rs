//! In-process STOMP broker.
//!
//! `SimBroker` plays the chat server's broker for simulation tests. It speaks
//! frames directly, with no sockets: a simulated link opens a connection,
//! hands client frames to [`SimBroker::receive`] and collects replies with
//! [`SimBroker::take_outbox`].
//!
//! Behaviour mirrors what the client relies on:
//! - `CONNECT` with a bearer token answers `CONNECTED` (or `ERROR` for a
//!   rejected token)
//! - subscriptions are per connection and vanish with it
//! - `/app/ping` answers on the sender's `/user/queue/ping` subscriptions
//! - `/app/chat/send` stores the message and fans it out on the room topic

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_proto::{
    Command, Frame, MessageId, Payload, TopicKey,
    destination::{CHAT_SEND_DESTINATION, PING_DESTINATION, PING_QUEUE},
    payloads::chat::OutboundChatMessage,
};
use serde_json::json;

/// Identifier of one broker-side connection.
pub type ConnectionId = u64;

/// Broker shared between simulated clients.
pub type SharedBroker = Arc<Mutex<SimBroker>>;

/// Create a broker that several simulated clients can share.
pub fn create_shared_broker(broker: SimBroker) -> SharedBroker {
    Arc::new(Mutex::new(broker))
}

/// Lock a shared broker. A poisoned lock still yields the broker.
pub fn lock_broker(broker: &SharedBroker) -> MutexGuard<'_, SimBroker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Connection {
    /// Handshake completed
    connected: bool,
    /// Subscription id -> destination
    subscriptions: BTreeMap<String, String>,
    outbox: VecDeque<Frame>,
}

/// Fake STOMP broker.
#[derive(Debug, Default)]
pub struct SimBroker {
    /// Only this token is accepted, if set; otherwise any non-blank token
    accepted_token: Option<String>,
    /// Leave `CONNECT` unanswered, to exercise handshake timeouts
    silent: bool,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection: ConnectionId,
    next_delivery: u64,
    next_chat_message: MessageId,
    /// Every `SEND` frame received, in order
    received: Vec<Frame>,
    handshakes: u64,
}

impl SimBroker {
    /// Broker accepting any non-blank token.
    pub fn new() -> Self {
        Self { next_chat_message: 1000, ..Self::default() }
    }

    /// Broker accepting only `token`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.accepted_token = Some(token.into());
        self
    }

    /// Stop answering (or resume answering) handshakes.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Accept a new connection.
    pub fn open(&mut self) -> ConnectionId {
        self.next_connection += 1;
        let id = self.next_connection;
        self.connections.insert(id, Connection::default());
        tracing::trace!(connection = id, "broker accepted connection");
        id
    }

    /// Drop a connection and its subscriptions. False if unknown.
    pub fn close(&mut self, connection: ConnectionId) -> bool {
        let closed = self.connections.remove(&connection).is_some();
        if closed {
            tracing::trace!(connection, "broker closed connection");
        }
        closed
    }

    /// Whether `connection` is open.
    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Whether `connection` completed the handshake.
    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.connections.get(&connection).is_some_and(|c| c.connected)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Handshakes answered with `CONNECTED` so far.
    pub fn handshakes(&self) -> u64 {
        self.handshakes
    }

    /// Process one client frame.
    pub fn receive(&mut self, connection: ConnectionId, frame: &Frame) {
        if !self.connections.contains_key(&connection) {
            tracing::debug!(connection, "frame for closed connection dropped");
            return;
        }

        match frame.command {
            Command::Connect | Command::Stomp => self.handshake(connection, frame),
            Command::Subscribe => {
                let (Some(id), Some(destination)) = (frame.header("id"), frame.destination()) else {
                    self.reply(connection, Frame::error("SUBSCRIBE needs id and destination"));
                    return;
                };
                if let Some(conn) = self.connected_mut(connection) {
                    conn.subscriptions.insert(id.to_string(), destination.to_string());
                }
            },
            Command::Unsubscribe => {
                if let Some(id) = frame.header("id")
                    && let Some(conn) = self.connected_mut(connection)
                {
                    conn.subscriptions.remove(id);
                }
            },
            Command::Send => self.on_send(connection, frame),
            Command::Disconnect => {
                if let Some(conn) = self.connections.get_mut(&connection) {
                    conn.connected = false;
                    conn.subscriptions.clear();
                }
            },
            other => tracing::debug!(connection, command = ?other, "unexpected client frame"),
        }
    }

    /// Take the frames queued for `connection`.
    pub fn take_outbox(&mut self, connection: ConnectionId) -> Vec<Frame> {
        self.connections
            .get_mut(&connection)
            .map(|conn| conn.outbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Deliver `body` to every subscription on `destination`. Returns the
    /// number of deliveries.
    pub fn publish(&mut self, destination: &str, body: &str) -> usize {
        let mut delivered = 0;
        for conn in self.connections.values_mut().filter(|c| c.connected) {
            for (id, subscribed) in &conn.subscriptions {
                if subscribed == destination {
                    self.next_delivery += 1;
                    let message_id = format!("m-{}", self.next_delivery);
                    conn.outbox.push_back(Frame::message(id, destination, &message_id, body.to_string()));
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Deliver a JSON value on a chat topic.
    pub fn publish_json(&mut self, topic: TopicKey, value: &serde_json::Value) -> usize {
        self.publish(&topic.destination(), &value.to_string())
    }

    /// Subscriptions of `connection` as `(id, destination)`.
    pub fn subscriptions(&self, connection: ConnectionId) -> Vec<(String, String)> {
        self.connections
            .get(&connection)
            .map(|c| c.subscriptions.iter().map(|(i, d)| (i.clone(), d.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of subscriptions on `destination` across all connections.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.connections
            .values()
            .flat_map(|c| c.subscriptions.values())
            .filter(|d| *d == destination)
            .count()
    }

    /// `SEND` frames received so far.
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Chat messages received on `/app/chat/send`.
    pub fn chat_messages(&self) -> Vec<OutboundChatMessage> {
        self.received
            .iter()
            .filter(|f| f.destination() == Some(CHAT_SEND_DESTINATION))
            .filter_map(|f| Payload::from_frame(f).deserialize().ok())
            .collect()
    }

    fn connected_mut(&mut self, connection: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&connection).filter(|c| c.connected)
    }

    fn reply(&mut self, connection: ConnectionId, frame: Frame) {
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.outbox.push_back(frame);
        }
    }

    fn handshake(&mut self, connection: ConnectionId, frame: &Frame) {
        if self.silent {
            return;
        }
        let token = frame
            .header("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let accepted = match (&self.accepted_token, token) {
            (_, None) => false,
            (Some(expected), Some(token)) => expected == token,
            (None, Some(_)) => true,
        };
        if !accepted {
            self.reply(connection, Frame::error("unauthorized"));
            return;
        }

        self.handshakes += 1;
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.connected = true;
        }
        self.reply(connection, Frame::connected(&format!("session-{connection}"), (0, 0)));
    }

    fn on_send(&mut self, connection: ConnectionId, frame: &Frame) {
        if self.connected_mut(connection).is_none() {
            self.reply(connection, Frame::error("not connected"));
            return;
        }
        self.received.push(frame.clone());

        match frame.destination() {
            Some(PING_DESTINATION) => {
                let pongs: Vec<String> = self
                    .connections
                    .get(&connection)
                    .map(|c| {
                        c.subscriptions
                            .iter()
                            .filter(|(_, d)| *d == PING_QUEUE)
                            .map(|(id, _)| id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for id in pongs {
                    self.next_delivery += 1;
                    let message_id = format!("m-{}", self.next_delivery);
                    let pong = Frame::message(&id, PING_QUEUE, &message_id, r#"{"type":"PONG"}"#);
                    self.reply(connection, pong);
                }
            },
            Some(CHAT_SEND_DESTINATION) => {
                let Ok(message) = Payload::from_frame(frame).deserialize::<OutboundChatMessage>()
                else {
                    self.reply(connection, Frame::error("malformed chat message"));
                    return;
                };
                self.next_chat_message += 1;
                let echo = json!({
                    "messageId": self.next_chat_message,
                    "roomId": message.room_id,
                    "senderId": connection,
                    "content": message.content,
                });
                self.publish_json(TopicKey::Room(message.room_id), &echo);
            },
            other => tracing::debug!(destination = ?other, "send to unrouted destination"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(broker: &mut SimBroker) -> ConnectionId {
        let conn = broker.open();
        broker.receive(conn, &Frame::connect("localhost", "token", (0, 0)));
        assert_eq!(broker.take_outbox(conn)[0].command, Command::Connected);
        conn
    }

    #[test]
    fn rejects_wrong_token() {
        let mut broker = SimBroker::new().with_token("secret");
        let conn = broker.open();
        broker.receive(conn, &Frame::connect("localhost", "guess", (0, 0)));

        let replies = broker.take_outbox(conn);
        assert_eq!(replies[0].command, Command::Error);
        assert!(!broker.is_connected(conn));
    }

    #[test]
    fn chat_send_is_echoed_on_room_topic() {
        let mut broker = SimBroker::new();
        let conn = connected(&mut broker);
        broker.receive(conn, &Frame::subscribe("sub-1", "/topic/room/4"));
        broker.receive(
            conn,
            &Frame::send(CHAT_SEND_DESTINATION, r#"{"roomId":4,"content":"hi"}"#, None),
        );

        let out = broker.take_outbox(conn);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].subscription(), Some("sub-1"));
        assert_eq!(broker.chat_messages()[0].content, "hi");
    }

    #[test]
    fn subscriptions_vanish_with_connection() {
        let mut broker = SimBroker::new();
        let conn = connected(&mut broker);
        broker.receive(conn, &Frame::subscribe("sub-1", "/user/queue/rooms"));
        assert_eq!(broker.subscriber_count("/user/queue/rooms"), 1);

        broker.close(conn);
        assert_eq!(broker.subscriber_count("/user/queue/rooms"), 0);
        assert_eq!(broker.publish("/user/queue/rooms", "{}"), 0);
    }
}
