//! Model world: the oracle for subscription intent and delivery.

use std::collections::BTreeMap;

use parley_proto::TopicKey;

use super::operation::{Operation, OperationResult, topic_key};

/// One handler registered through the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandler {
    /// Topic it listens on
    pub topic: TopicKey,
    /// Still registered
    pub active: bool,
    /// Payloads it should have received
    pub delivered: usize,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Active handler count per desired topic
    pub desired: BTreeMap<TopicKey, usize>,
    /// Deliveries per handler, in registration order
    pub delivered: Vec<usize>,
}

/// Reference implementation of one client's subscription intent.
///
/// The model does not simulate the transport. Callers pass in whether the
/// real client is connected, which decides whether publishes arrive.
#[derive(Debug, Clone, Default)]
pub struct ModelWorld {
    handlers: Vec<ModelHandler>,
}

impl ModelWorld {
    /// Model with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers registered so far, in registration order.
    pub fn handlers(&self) -> &[ModelHandler] {
        &self.handlers
    }

    /// Apply `op`. `connected` is the real client's state before the
    /// operation.
    pub fn apply(&mut self, op: &Operation, connected: bool) -> OperationResult {
        match op {
            Operation::ConnectWithoutToken => OperationResult::Rejected,
            Operation::Disconnect => {
                for handler in &mut self.handlers {
                    handler.active = false;
                }
                OperationResult::Ok
            },
            Operation::Subscribe { topic } => {
                self.handlers.push(ModelHandler {
                    topic: topic_key(*topic),
                    active: true,
                    delivered: 0,
                });
                OperationResult::Ok
            },
            Operation::Unsubscribe { slot } => {
                if self.handlers.is_empty() {
                    return OperationResult::Unsubscribed(false);
                }
                let index = usize::from(*slot) % self.handlers.len();
                let handler = &mut self.handlers[index];
                let was_active = handler.active;
                handler.active = false;
                OperationResult::Unsubscribed(was_active)
            },
            Operation::Publish { topic } => {
                if connected {
                    self.deliver(topic_key(*topic));
                }
                OperationResult::Ok
            },
            Operation::SendMessage { room, blank } => {
                let sent = connected && !blank;
                if sent {
                    self.deliver(TopicKey::Room(u64::from(room % 3 + 1)));
                }
                OperationResult::Sent(sent)
            },
            Operation::Connect
            | Operation::DropConnection
            | Operation::Partition
            | Operation::Heal
            | Operation::AdvanceTime { .. } => OperationResult::Ok,
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let mut desired = BTreeMap::new();
        for handler in self.handlers.iter().filter(|h| h.active) {
            *desired.entry(handler.topic).or_insert(0) += 1;
        }
        ObservableState { desired, delivered: self.handlers.iter().map(|h| h.delivered).collect() }
    }

    fn deliver(&mut self, topic: TopicKey) {
        for handler in self.handlers.iter_mut().filter(|h| h.active && h.topic == topic) {
            handler.delivered += 1;
        }
    }
}
