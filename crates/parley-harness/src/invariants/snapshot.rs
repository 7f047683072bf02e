//! Observable state extracted for invariant checks.

use std::collections::{BTreeMap, BTreeSet};

use parley_core::TransportState;
use parley_proto::TopicKey;

use crate::{sim_broker::lock_broker, sim_client::SimClient};

/// What one client and its broker connection look like at a moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    /// Client index within the simulation
    pub id: usize,
    /// Transport state
    pub state: TransportState,
    /// Topics with at least one handler
    pub desired: BTreeSet<TopicKey>,
    /// Live subscriptions as topic -> subscription id
    pub live: BTreeMap<TopicKey, String>,
    /// Broker-side subscriptions of the client's open connection, as
    /// `(id, destination)`. `None` without a connection.
    pub broker: Option<Vec<(String, String)>>,
}

impl ClientSnapshot {
    /// Snapshot of a simulated client.
    pub fn from_client(id: usize, client: &SimClient) -> Self {
        let registry = client.registry();
        let broker = client.connection().and_then(|connection| {
            let broker = lock_broker(client.broker());
            broker.is_open(connection).then(|| broker.subscriptions(connection))
        });

        Self {
            id,
            state: client.state(),
            desired: registry.desired_topics().collect(),
            live: registry.live_subscriptions().map(|l| (l.topic, l.id.clone())).collect(),
            broker,
        }
    }
}

/// State of every client in the simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    /// One entry per client
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// No clients.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Snapshot of several simulated clients.
    pub fn from_clients<'a>(clients: impl IntoIterator<Item = &'a SimClient>) -> Self {
        let clients =
            clients.into_iter().enumerate().map(|(i, c)| ClientSnapshot::from_client(i, c)).collect();
        Self { clients }
    }
}
