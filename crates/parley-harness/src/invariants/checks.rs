//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::{BTreeMap, BTreeSet};

use parley_core::{TransportState, transport::LIVENESS_SUBSCRIPTION};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Live subscriptions exist exactly for desired topics while connected, and
/// not at all otherwise.
pub struct LiveMatchesDesired;

impl Invariant for LiveMatchesDesired {
    fn name(&self) -> &'static str {
        "live_matches_desired"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let live: BTreeSet<_> = client.live.keys().copied().collect();
            let expected =
                if client.state == TransportState::Connected { client.desired.clone() } else { BTreeSet::new() };
            if live != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} ({:?}): live {live:?}, expected {expected:?}",
                        client.id, client.state
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The broker never holds two subscriptions to one destination for the same
/// connection.
pub struct NoDuplicateBrokerSubscriptions;

impl Invariant for NoDuplicateBrokerSubscriptions {
    fn name(&self) -> &'static str {
        "no_duplicate_broker_subscriptions"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(subscriptions) = &client.broker else {
                continue;
            };
            let mut seen = BTreeSet::new();
            for (_, destination) in subscriptions {
                if !seen.insert(destination.as_str()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {}: {destination} subscribed twice", client.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// While connected, what the broker has is what the client thinks is live.
pub struct BrokerMatchesLive;

impl Invariant for BrokerMatchesLive {
    fn name(&self) -> &'static str {
        "broker_matches_live"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.state != TransportState::Connected {
                continue;
            }
            let Some(subscriptions) = &client.broker else {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: connected without a broker connection", client.id),
                });
            };

            let broker: BTreeMap<&str, &str> = subscriptions
                .iter()
                .filter(|(id, _)| id != LIVENESS_SUBSCRIPTION)
                .map(|(id, destination)| (id.as_str(), destination.as_str()))
                .collect();
            let live: Vec<(String, String)> =
                client.live.iter().map(|(topic, id)| (id.clone(), topic.destination())).collect();
            let live: BTreeMap<&str, &str> =
                live.iter().map(|(id, destination)| (id.as_str(), destination.as_str())).collect();

            if broker != live {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: broker {broker:?}, live {live:?}", client.id),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parley_proto::TopicKey;

    use super::*;
    use crate::ClientSnapshot;

    fn snapshot(state: TransportState, live: &[TopicKey], broker: &[(&str, &str)]) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot {
            id: 0,
            state,
            desired: [TopicKey::Room(1)].into_iter().collect(),
            live: live
                .iter()
                .enumerate()
                .map(|(i, t)| (*t, format!("sub-{}", i + 1)))
                .collect::<BTreeMap<_, _>>(),
            broker: Some(broker.iter().map(|(i, d)| ((*i).to_string(), (*d).to_string())).collect()),
        })
    }

    #[test]
    fn detects_live_without_connection() {
        let state = snapshot(TransportState::Disconnected, &[TopicKey::Room(1)], &[]);
        assert!(LiveMatchesDesired.check(&state).is_err());
    }

    #[test]
    fn detects_duplicate_destination() {
        let state = snapshot(TransportState::Connected, &[TopicKey::Room(1)], &[
            ("sub-1", "/topic/room/1"),
            ("sub-2", "/topic/room/1"),
        ]);
        assert!(NoDuplicateBrokerSubscriptions.check(&state).is_err());
        assert!(BrokerMatchesLive.check(&state).is_err());
    }

    #[test]
    fn liveness_subscription_is_ignored() {
        let state = snapshot(TransportState::Connected, &[TopicKey::Room(1)], &[
            ("liveness", "/user/queue/ping"),
            ("sub-1", "/topic/room/1"),
        ]);
        assert!(BrokerMatchesLive.check(&state).is_ok());
        assert!(LiveMatchesDesired.check(&state).is_ok());
    }
}
