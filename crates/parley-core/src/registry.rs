//! Subscription registry.
//!
//! Two maps keyed by [`TopicKey`]:
//!
//! - desired: every handler the application registered for a topic, kept
//!   regardless of connection state
//! - live: the broker subscription currently backing a topic, if any
//!
//! The registry itself never decides when a topic should be live; that is
//! [`crate::reconcile`]'s job. It only stores intent, hands out subscription
//! ids, and fans inbound payloads out to handlers.
//!
//! # Invariants
//!
//! - A desired entry exists only while it has at least one handler.
//! - Each live subscription has a unique id, and at most one exists per topic.
//! - Handlers of a topic run in registration order.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

use parley_proto::{Frame, Payload, TopicKey};

use crate::error::HandlerError;

/// Callback invoked for every payload delivered on a topic.
pub type Handler = Box<dyn FnMut(&Payload) -> Result<(), HandlerError> + Send>;

/// Identity of one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

/// Returned by subscribe; pass it back to unsubscribe that exact handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    topic: TopicKey,
    handler: HandlerId,
}

impl SubscriptionToken {
    /// Topic the handler is registered on.
    pub fn topic(&self) -> TopicKey {
        self.topic
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.handler.0)
    }
}

/// Broker subscription backing a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSubscription {
    /// STOMP subscription id (`sub-{n}`)
    pub id: String,
    /// Topic it serves
    pub topic: TopicKey,
}

impl LiveSubscription {
    /// `SUBSCRIBE` frame establishing this subscription.
    pub fn subscribe_frame(&self) -> Frame {
        Frame::subscribe(&self.id, &self.topic.destination())
    }

    /// `UNSUBSCRIBE` frame cancelling this subscription.
    pub fn unsubscribe_frame(&self) -> Frame {
        Frame::unsubscribe(&self.id)
    }
}

/// Outcome of delivering one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
}

/// Desired and live subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    desired: BTreeMap<TopicKey, BTreeMap<HandlerId, Handler>>,
    live: BTreeMap<TopicKey, LiveSubscription>,
    /// Subscription id -> topic, for routing MESSAGE frames
    routes: HashMap<String, TopicKey>,
    next_handler: u64,
    next_subscription: u64,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desired: BTreeMap<_, _> = self.desired.iter().map(|(k, h)| (*k, h.len())).collect();
        f.debug_struct("SubscriptionRegistry")
            .field("desired", &desired)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `topic`. Creates the desired entry if needed.
    pub fn add(&mut self, topic: TopicKey, handler: Handler) -> SubscriptionToken {
        self.next_handler += 1;
        let id = HandlerId(self.next_handler);
        self.desired.entry(topic).or_default().insert(id, handler);

        tracing::debug!(%topic, handler = id.0, "handler registered");
        SubscriptionToken { topic, handler: id }
    }

    /// Remove the handler behind `token`.
    ///
    /// Returns false if it was already removed. The desired entry goes away
    /// with its last handler.
    pub fn remove(&mut self, token: SubscriptionToken) -> bool {
        let Some(handlers) = self.desired.get_mut(&token.topic) else {
            return false;
        };
        let removed = handlers.remove(&token.handler).is_some();
        if handlers.is_empty() {
            self.desired.remove(&token.topic);
        }
        if removed {
            tracing::debug!(topic = %token.topic, handler = token.handler.0, "handler removed");
        }
        removed
    }

    /// Whether `topic` has at least one handler.
    pub fn is_desired(&self, topic: TopicKey) -> bool {
        self.desired.contains_key(&topic)
    }

    /// Number of handlers on `topic`.
    pub fn handler_count(&self, topic: TopicKey) -> usize {
        self.desired.get(&topic).map_or(0, BTreeMap::len)
    }

    /// Topics with at least one handler, in key order.
    pub fn desired_topics(&self) -> impl Iterator<Item = TopicKey> + '_ {
        self.desired.keys().copied()
    }

    /// Live subscription for `topic`.
    pub fn live(&self, topic: TopicKey) -> Option<&LiveSubscription> {
        self.live.get(&topic)
    }

    /// Whether `topic` is backed by a broker subscription.
    pub fn is_live(&self, topic: TopicKey) -> bool {
        self.live.contains_key(&topic)
    }

    /// All live subscriptions, in key order.
    pub fn live_subscriptions(&self) -> impl Iterator<Item = &LiveSubscription> + '_ {
        self.live.values()
    }

    /// Topic served by subscription `id`.
    pub fn topic_for(&self, id: &str) -> Option<TopicKey> {
        self.routes.get(id).copied()
    }

    /// Allocate a live subscription for `topic`.
    ///
    /// Returns `None` if one already exists.
    pub fn establish(&mut self, topic: TopicKey) -> Option<LiveSubscription> {
        if self.live.contains_key(&topic) {
            return None;
        }
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;

        let live = LiveSubscription { id: id.clone(), topic };
        self.routes.insert(id, topic);
        self.live.insert(topic, live.clone());

        tracing::debug!(%topic, id = %live.id, "live subscription established");
        Some(live)
    }

    /// Drop the live subscription for `topic`, returning it.
    pub fn release(&mut self, topic: TopicKey) -> Option<LiveSubscription> {
        let live = self.live.remove(&topic)?;
        self.routes.remove(&live.id);
        tracing::debug!(%topic, id = %live.id, "live subscription released");
        Some(live)
    }

    /// Drop every live subscription without touching desired entries.
    pub fn release_all(&mut self) -> Vec<LiveSubscription> {
        self.routes.clear();
        let released: Vec<_> = std::mem::take(&mut self.live).into_values().collect();
        if !released.is_empty() {
            tracing::debug!(count = released.len(), "live subscriptions released");
        }
        released
    }

    /// Full reset: drop every handler and every live subscription.
    pub fn clear(&mut self) -> Vec<LiveSubscription> {
        self.desired.clear();
        self.release_all()
    }

    /// Deliver `payload` to every handler on `topic`.
    ///
    /// Each handler runs in isolation: an `Err` or a panic is logged and the
    /// remaining handlers still run.
    pub fn dispatch(&mut self, topic: TopicKey, payload: &Payload) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handlers) = self.desired.get_mut(&topic) else {
            tracing::debug!(%topic, "payload for topic without handlers dropped");
            return report;
        };

        for (id, handler) in handlers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(%topic, handler = id.0, error = %e, "handler failed");
                },
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(%topic, handler = id.0, "handler panicked");
                },
            }
        }
        report
    }

    /// Deliver a MESSAGE received on subscription `id`.
    ///
    /// Returns `None` if no live subscription has that id (already released,
    /// or never ours).
    pub fn route(&mut self, id: &str, payload: &Payload) -> Option<(TopicKey, DispatchReport)> {
        let Some(topic) = self.topic_for(id) else {
            tracing::debug!(subscription = id, "message for unknown subscription dropped");
            return None;
        };
        Some((topic, self.dispatch(topic, payload)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        Box::new(move |payload: &Payload| {
            log.lock().unwrap().push(format!("{name}:{}", payload.raw().unwrap_or("json")));
            Ok(())
        })
    }

    #[test]
    fn desired_entry_lives_while_it_has_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        let a = registry.add(TopicKey::Room(1), recorder(&log, "a"));
        let b = registry.add(TopicKey::Room(1), recorder(&log, "b"));
        assert_eq!(registry.handler_count(TopicKey::Room(1)), 2);

        assert!(registry.remove(a));
        assert!(registry.is_desired(TopicKey::Room(1)));
        assert!(!registry.remove(a));

        assert!(registry.remove(b));
        assert!(!registry.is_desired(TopicKey::Room(1)));
    }

    #[test]
    fn dispatch_reaches_every_handler_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.add(TopicKey::Room(1), recorder(&log, "first"));
        registry.add(TopicKey::Room(1), recorder(&log, "second"));
        registry.add(TopicKey::Room(2), recorder(&log, "other"));

        let report = registry.dispatch(TopicKey::Room(1), &Payload::Raw("x".into()));
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["first:x", "second:x"]);
    }

    #[test]
    fn failing_handlers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.add(TopicKey::Room(1), Box::new(|_: &Payload| Err("boom".into())));
        registry.add(
            TopicKey::Room(1),
            Box::new(|_: &Payload| -> Result<(), HandlerError> { panic!("handler bug") }),
        );
        registry.add(TopicKey::Room(1), recorder(&log, "ok"));

        let report = registry.dispatch(TopicKey::Room(1), &Payload::Raw("x".into()));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["ok:x"]);
    }

    #[test]
    fn live_ids_are_unique_and_routed() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.establish(TopicKey::Room(1)).unwrap();
        assert!(registry.establish(TopicKey::Room(1)).is_none());

        registry.release(TopicKey::Room(1));
        let second = registry.establish(TopicKey::Room(1)).unwrap();
        assert_ne!(first.id, second.id);

        assert_eq!(registry.topic_for(&second.id), Some(TopicKey::Room(1)));
        assert_eq!(registry.topic_for(&first.id), None);
        assert!(registry.route(&first.id, &Payload::Raw(String::new())).is_none());
    }

    #[test]
    fn release_all_keeps_intent_and_clear_drops_it() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.add(TopicKey::RoomsIndex, recorder(&log, "rooms"));
        registry.establish(TopicKey::RoomsIndex);

        assert_eq!(registry.release_all().len(), 1);
        assert!(registry.is_desired(TopicKey::RoomsIndex));
        assert!(!registry.is_live(TopicKey::RoomsIndex));

        registry.establish(TopicKey::RoomsIndex);
        assert_eq!(registry.clear().len(), 1);
        assert_eq!(registry.desired_topics().count(), 0);
    }

    #[test]
    fn frames_use_topic_destination() {
        let live = LiveSubscription { id: "sub-3".into(), topic: TopicKey::RoomRead(9) };
        let frame = live.subscribe_frame();
        assert_eq!(frame.header("id"), Some("sub-3"));
        assert_eq!(frame.destination(), Some("/topic/room/9/read"));
        assert_eq!(live.unsubscribe_frame().header("id"), Some("sub-3"));
    }
}
