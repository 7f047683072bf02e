//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! client behaves identically to the reference model.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (SimClient)    Results
//! ```

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parley_client::{Payload, SubscriptionToken, TopicKey, TransportConfig, TransportState};
use parley_core::Handler;
use parley_harness::{
    InvariantRegistry, ModelWorld, ObservableState, Operation, OperationResult, SimBroker,
    SimClient, SimEnv, SystemSnapshot, create_shared_broker, lock_broker, topic_key,
};
use proptest::prelude::*;
use serde_json::json;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    client: SimClient,
    tokens: Vec<SubscriptionToken>,
    counters: Vec<Arc<AtomicUsize>>,
    published: u64,
}

impl RealWorld {
    fn new() -> Self {
        let broker = create_shared_broker(SimBroker::new());
        Self {
            client: SimClient::new(SimEnv::new(), broker, TransportConfig::default()),
            tokens: Vec::new(),
            counters: Vec::new(),
            published: 0,
        }
    }

    fn connected(&self) -> bool {
        self.client.state() == TransportState::Connected
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Connect => {
                self.client.connect("token").unwrap();
                OperationResult::Ok
            },
            Operation::ConnectWithoutToken => match self.client.connect("   ") {
                Ok(()) => OperationResult::Ok,
                Err(_) => OperationResult::Rejected,
            },
            Operation::Disconnect => {
                self.client.disconnect();
                OperationResult::Ok
            },
            Operation::Subscribe { topic } => {
                let count = Arc::new(AtomicUsize::new(0));
                let seen = Arc::clone(&count);
                let handler: Handler = Box::new(move |_: &Payload| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                let token = self.client.subscribe(topic_key(*topic), handler);
                self.tokens.push(token);
                self.counters.push(count);
                OperationResult::Ok
            },
            Operation::Unsubscribe { slot } => {
                if self.tokens.is_empty() {
                    return OperationResult::Unsubscribed(false);
                }
                let token = self.tokens[usize::from(*slot) % self.tokens.len()];
                OperationResult::Unsubscribed(self.client.unsubscribe(token))
            },
            Operation::Publish { topic } => {
                self.published += 1;
                let body = json!({"messageId": self.published, "content": "published"});
                lock_broker(self.client.broker()).publish_json(topic_key(*topic), &body);
                self.client.pump();
                OperationResult::Ok
            },
            Operation::SendMessage { room, blank } => {
                let content = if *blank { "  \n " } else { "hello" };
                let room = u64::from(room % 3 + 1);
                OperationResult::Sent(self.client.send_room_message(room, content))
            },
            Operation::DropConnection => {
                self.client.drop_connection();
                OperationResult::Ok
            },
            Operation::Partition => {
                self.client.set_reachable(false);
                OperationResult::Ok
            },
            Operation::Heal => {
                self.client.set_reachable(true);
                OperationResult::Ok
            },
            Operation::AdvanceTime { millis } => {
                self.client.advance(Duration::from_millis(u64::from(*millis)));
                OperationResult::Ok
            },
        }
    }

    fn observable_state(&self) -> ObservableState {
        let registry = self.client.registry();
        let desired: BTreeMap<TopicKey, usize> = registry
            .desired_topics()
            .map(|topic| (topic, registry.handler_count(topic)))
            .collect();
        let delivered = self.counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        ObservableState { desired, delivered }
    }
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let topic = 0..7u8;

    prop_oneof![
        3 => Just(Operation::Connect),
        1 => Just(Operation::ConnectWithoutToken),
        1 => Just(Operation::Disconnect),
        4 => topic.clone().prop_map(|topic| Operation::Subscribe { topic }),
        2 => any::<u8>().prop_map(|slot| Operation::Unsubscribe { slot }),
        4 => topic.prop_map(|topic| Operation::Publish { topic }),
        2 => (0..3u8, any::<bool>())
            .prop_map(|(room, blank)| Operation::SendMessage { room, blank }),
        1 => Just(Operation::DropConnection),
        1 => Just(Operation::Partition),
        1 => Just(Operation::Heal),
        2 => (0..20_000u16).prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

proptest! {
    /// Operation results and final state agree between model and client.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..60)) {
        let mut model = ModelWorld::new();
        let mut real = RealWorld::new();

        for (i, op) in ops.iter().enumerate() {
            let connected = real.connected();
            let model_result = model.apply(op, connected);
            let real_result = real.apply(op);

            prop_assert_eq!(
                model_result,
                real_result,
                "Divergence at operation {}: {:?} (connected: {})",
                i, op, connected
            );
        }

        prop_assert_eq!(model.observable_state(), real.observable_state());
    }

    /// Subscription invariants hold after every operation.
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(operation_strategy(), 0..60)) {
        let registry = InvariantRegistry::standard();
        let mut real = RealWorld::new();

        for (i, op) in ops.iter().enumerate() {
            real.apply(op);
            let snapshot = SystemSnapshot::from_clients([&real.client]);
            if let Err(violations) = registry.check_all(&snapshot) {
                prop_assert!(false, "after operation {} ({:?}): {:?}", i, op, violations);
            }
        }
    }

    /// Once the broker is reachable again, the client always comes back.
    #[test]
    fn prop_reconnects_after_faults(ops in prop::collection::vec(operation_strategy(), 0..40)) {
        let mut real = RealWorld::new();
        for op in &ops {
            real.apply(op);
        }

        real.apply(&Operation::Heal);
        real.apply(&Operation::Connect);
        real.client.run_for(Duration::from_secs(120), Duration::from_secs(1));

        prop_assert_eq!(real.client.state(), TransportState::Connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_before_connect_is_lost_in_both() {
        let mut model = ModelWorld::new();
        let mut real = RealWorld::new();
        let ops = [
            Operation::Subscribe { topic: 1 },
            Operation::Publish { topic: 1 },
            Operation::Connect,
            Operation::Publish { topic: 1 },
        ];
        for op in &ops {
            let connected = real.connected();
            assert_eq!(model.apply(op, connected), real.apply(op));
        }

        assert_eq!(real.observable_state().delivered, vec![1]);
        assert_eq!(model.observable_state(), real.observable_state());
    }

    #[test]
    fn shared_topic_survives_partial_unsubscribe() {
        let mut real = RealWorld::new();
        real.apply(&Operation::Connect);
        real.apply(&Operation::Subscribe { topic: 4 });
        real.apply(&Operation::Subscribe { topic: 4 });
        assert_eq!(
            real.apply(&Operation::Unsubscribe { slot: 0 }),
            OperationResult::Unsubscribed(true)
        );
        real.apply(&Operation::Publish { topic: 4 });

        assert_eq!(real.observable_state().delivered, vec![0, 1]);
        assert!(real.client.registry().is_live(TopicKey::RoomRead(1)));
    }
}
