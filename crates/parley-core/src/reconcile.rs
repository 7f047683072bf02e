//! Reconciliation between desired and live subscriptions.
//!
//! One rule, applied per topic: a topic is live exactly when the transport is
//! connected and the topic has at least one handler. [`reconcile_topic`]
//! restores that rule for a single key after a subscribe or unsubscribe;
//! [`reconcile_all`] applies it to every key after a connection transition.
//!
//! The returned operations say what changed. The caller turns them into
//! `SUBSCRIBE`/`UNSUBSCRIBE` frames when the socket is up, and drops them when
//! it is not (the broker already forgot a dead socket's subscriptions).

use std::collections::BTreeSet;

use parley_proto::{Frame, TopicKey};

use crate::registry::{LiveSubscription, SubscriptionRegistry};

/// Change made to restore the invariant for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOp {
    /// A live subscription was allocated and must be sent to the broker
    Subscribe(LiveSubscription),
    /// A live subscription was dropped
    Release(LiveSubscription),
}

impl ReconcileOp {
    /// Frame telling the broker about this change.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Subscribe(live) => live.subscribe_frame(),
            Self::Release(live) => live.unsubscribe_frame(),
        }
    }

    /// Topic concerned.
    pub fn topic(&self) -> TopicKey {
        match self {
            Self::Subscribe(live) | Self::Release(live) => live.topic,
        }
    }
}

/// Restore the invariant for `topic`.
pub fn reconcile_topic(
    registry: &mut SubscriptionRegistry,
    topic: TopicKey,
    connected: bool,
) -> Option<ReconcileOp> {
    let wanted = connected && registry.is_desired(topic);
    match (wanted, registry.is_live(topic)) {
        (true, false) => registry.establish(topic).map(ReconcileOp::Subscribe),
        (false, true) => registry.release(topic).map(ReconcileOp::Release),
        _ => None,
    }
}

/// Restore the invariant for every topic that is desired or live.
pub fn reconcile_all(registry: &mut SubscriptionRegistry, connected: bool) -> Vec<ReconcileOp> {
    let topics: BTreeSet<TopicKey> = registry
        .desired_topics()
        .chain(registry.live_subscriptions().map(|live| live.topic))
        .collect();

    topics.into_iter().filter_map(|topic| reconcile_topic(registry, topic, connected)).collect()
}

#[cfg(test)]
mod tests {
    use parley_proto::Payload;

    use super::*;
    use crate::registry::Handler;

    fn noop() -> Handler {
        Box::new(|_: &Payload| Ok(()))
    }

    #[test]
    fn connected_and_desired_becomes_live() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(TopicKey::Room(1), noop());

        assert_eq!(reconcile_topic(&mut registry, TopicKey::Room(1), false), None);
        assert!(!registry.is_live(TopicKey::Room(1)));

        let op = reconcile_topic(&mut registry, TopicKey::Room(1), true).unwrap();
        assert!(matches!(op, ReconcileOp::Subscribe(_)));
        assert_eq!(reconcile_topic(&mut registry, TopicKey::Room(1), true), None);
    }

    #[test]
    fn last_handler_removed_releases() {
        let mut registry = SubscriptionRegistry::new();
        let token = registry.add(TopicKey::Room(1), noop());
        reconcile_topic(&mut registry, TopicKey::Room(1), true);

        registry.remove(token);
        let op = reconcile_topic(&mut registry, TopicKey::Room(1), true).unwrap();
        assert_eq!(op.to_frame().command, parley_proto::Command::Unsubscribe);
        assert!(!registry.is_live(TopicKey::Room(1)));
    }

    #[test]
    fn reconcile_all_follows_connection() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(TopicKey::RoomsIndex, noop());
        registry.add(TopicKey::Room(1), noop());
        registry.add(TopicKey::RoomRead(1), noop());

        let ops = reconcile_all(&mut registry, true);
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| matches!(op, ReconcileOp::Subscribe(_))));

        let ops = reconcile_all(&mut registry, false);
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| matches!(op, ReconcileOp::Release(_))));
        assert_eq!(registry.desired_topics().count(), 3);
        assert_eq!(registry.live_subscriptions().count(), 0);
    }
}
