//! Connection lifecycle under faults.
//!
//! Every test runs a real `ChatClient` against the in-process broker on a
//! virtual clock, so retries and timeouts play out in microseconds.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parley_client::{Payload, TopicKey, TransportConfig, TransportState};
use parley_core::Handler;
use parley_harness::{
    InvariantRegistry, SimBroker, SimClient, SimEnv, SystemSnapshot, create_shared_broker,
    lock_broker,
};
use serde_json::json;

const STEP: Duration = Duration::from_secs(1);

fn counter() -> (Arc<AtomicUsize>, Handler) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let handler: Handler = Box::new(move |_: &Payload| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (count, handler)
}

fn client_with(broker: SimBroker) -> SimClient {
    SimClient::new(SimEnv::new(), create_shared_broker(broker), TransportConfig::default())
}

fn assert_invariants(client: &SimClient, context: &str) {
    InvariantRegistry::standard().assert_all(&SystemSnapshot::from_clients([client]), context);
}

fn broker_destinations(client: &SimClient) -> Vec<String> {
    let connection = client.connection().expect("open connection");
    let mut destinations: Vec<String> = lock_broker(client.broker())
        .subscriptions(connection)
        .into_iter()
        .map(|(_, destination)| destination)
        .collect();
    destinations.sort();
    destinations
}

#[test]
fn subscriptions_made_offline_are_sent_on_connect() {
    let mut client = client_with(SimBroker::new());
    let (_, handler) = counter();
    client.subscribe(TopicKey::Room(5), handler);
    assert_eq!(lock_broker(client.broker()).connection_count(), 0);

    client.connect("token").unwrap();

    assert!(broker_destinations(&client).contains(&TopicKey::Room(5).destination()));
    assert_invariants(&client, "after connect");
}

#[test]
fn reconnect_restores_each_topic_once() {
    let mut client = client_with(SimBroker::new());
    let (first, handler) = counter();
    client.subscribe(TopicKey::Room(1), handler);
    let (second, handler) = counter();
    client.subscribe(TopicKey::Room(1), handler);
    let (_, handler) = counter();
    client.subscribe(TopicKey::RoomsIndex, handler);
    client.connect("token").unwrap();
    let before = broker_destinations(&client);

    client.drop_connection();
    assert_eq!(client.state(), TransportState::Disconnected);
    assert_invariants(&client, "after drop");

    client.run_for(Duration::from_secs(5), STEP);
    assert_eq!(client.state(), TransportState::Connected);
    assert_eq!(broker_destinations(&client), before);
    assert_invariants(&client, "after reconnect");

    lock_broker(client.broker()).publish_json(TopicKey::Room(1), &json!({"messageId": 1}));
    client.pump();
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn partition_is_retried_until_healed() {
    let mut client = client_with(SimBroker::new());
    client.set_reachable(false);
    client.connect("token").unwrap();

    client.run_for(Duration::from_secs(60), STEP);
    assert_eq!(client.state(), TransportState::Disconnected);
    assert!(client.sockets_opened() >= 10, "opened {}", client.sockets_opened());

    client.set_reachable(true);
    client.run_for(Duration::from_secs(4), STEP);
    assert_eq!(client.state(), TransportState::Connected);
}

#[test]
fn silent_broker_hits_handshake_timeout() {
    let mut client = client_with(SimBroker::new());
    lock_broker(client.broker()).set_silent(true);
    client.connect("token").unwrap();

    client.run_for(Duration::from_secs(30), STEP);
    assert_eq!(client.state(), TransportState::Connecting);

    lock_broker(client.broker()).set_silent(false);
    client.run_for(Duration::from_secs(5), STEP);

    assert_eq!(client.state(), TransportState::Connected);
    assert_eq!(client.sockets_opened(), 2);
    assert_eq!(
        client.statuses(),
        [
            TransportState::Connecting,
            TransportState::Disconnected,
            TransportState::Connecting,
            TransportState::Connected,
        ]
    );
}

#[test]
fn rejected_token_keeps_retrying() {
    let mut client = client_with(SimBroker::new().with_token("secret"));
    client.connect("guess").unwrap();

    assert_eq!(client.state(), TransportState::Disconnected);
    assert_eq!(client.broker_errors(), ["unauthorized"]);

    client.run_for(Duration::from_secs(10), STEP);
    assert!(client.sockets_opened() >= 3);
    assert_eq!(client.broker_errors().len(), client.sockets_opened());
    assert_eq!(lock_broker(client.broker()).handshakes(), 0);
}

#[test]
fn disconnect_forgets_subscriptions_and_stays_down() {
    let mut client = client_with(SimBroker::new());
    let (count, handler) = counter();
    client.subscribe(TopicKey::RoomRead(2), handler);
    client.connect("token").unwrap();

    client.disconnect();
    assert_eq!(client.registry().desired_topics().count(), 0);
    assert_eq!(lock_broker(client.broker()).connection_count(), 0);

    client.run_for(Duration::from_secs(30), STEP);
    assert_eq!(client.state(), TransportState::Disconnected);
    assert_eq!(client.sockets_opened(), 1);

    client.connect("token").unwrap();
    lock_broker(client.broker()).publish_json(TopicKey::RoomRead(2), &json!({"lastReadMessageId": 9}));
    client.pump();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn send_while_reconnecting_is_refused() {
    let mut client = client_with(SimBroker::new());
    client.connect("token").unwrap();
    assert!(client.send_room_message(3, "first"));

    client.drop_connection();
    assert!(!client.send_room_message(3, "lost"));

    client.run_for(Duration::from_secs(4), STEP);
    assert!(client.send_room_message(3, "second"));

    let contents: Vec<_> = lock_broker(client.broker())
        .chat_messages()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["first", "second"]);
}
