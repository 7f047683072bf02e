//! Fuzz target for the connection state machine
//!
//! Drives a real client against the in-process broker with arbitrary
//! interleavings of caller actions, network faults and time.
//!
//! # Invariants
//!
//! - Live subscriptions match desired topics whenever connected
//! - The broker never holds a destination twice for one connection
//! - Broker and client agree on what is live
//! - Once reachable and connected again, the client recovers

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{Handler, SubscriptionToken, TransportConfig, TransportState};
use parley_harness::{
    InvariantRegistry, SimBroker, SimClient, SimEnv, SystemSnapshot, create_shared_broker,
    lock_broker, topic_key,
};
use parley_proto::Payload;
use serde_json::json;

#[derive(Debug, Clone, Arbitrary)]
enum Action {
    Connect,
    Disconnect,
    Subscribe(u8),
    Unsubscribe(u8),
    Publish(u8),
    Send { room: u8, content: String },
    Drop,
    Partition,
    Heal,
    Silence(bool),
    Advance(u16),
}

fuzz_target!(|actions: Vec<Action>| {
    let broker = create_shared_broker(SimBroker::new());
    let mut client = SimClient::new(SimEnv::new(), broker, TransportConfig::default());
    let registry = InvariantRegistry::standard();
    let mut tokens: Vec<SubscriptionToken> = Vec::new();

    for action in actions.into_iter().take(256) {
        match action {
            Action::Connect => {
                let _ = client.connect("token");
            },
            Action::Disconnect => client.disconnect(),
            Action::Subscribe(topic) => {
                let handler: Handler = Box::new(|_: &Payload| Ok(()));
                tokens.push(client.subscribe(topic_key(topic), handler));
            },
            Action::Unsubscribe(slot) => {
                if !tokens.is_empty() {
                    let token = tokens[usize::from(slot) % tokens.len()];
                    client.unsubscribe(token);
                }
            },
            Action::Publish(topic) => {
                lock_broker(client.broker()).publish_json(topic_key(topic), &json!({"id": 1}));
                client.pump();
            },
            Action::Send { room, content } => {
                client.send_room_message(u64::from(room), &content);
            },
            Action::Drop => client.drop_connection(),
            Action::Partition => client.set_reachable(false),
            Action::Heal => client.set_reachable(true),
            Action::Silence(silent) => lock_broker(client.broker()).set_silent(silent),
            Action::Advance(millis) => client.advance(Duration::from_millis(u64::from(millis))),
        }

        let snapshot = SystemSnapshot::from_clients([&client]);
        registry.assert_all(&snapshot, "after fuzz action");
    }

    client.set_reachable(true);
    lock_broker(client.broker()).set_silent(false);
    let _ = client.connect("token");
    client.run_for(Duration::from_secs(60), Duration::from_secs(1));
    assert_eq!(client.state(), TransportState::Connected);
});
