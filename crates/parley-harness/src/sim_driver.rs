//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`parley_app::Runtime`] orchestration code runs in both production and
//! simulation, with a [`SimClient`] standing in for the WebSocket.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_app::{App, AppEvent, Bridge, Driver};
use parley_client::{RoomId, SubscriptionToken, TopicKey, TransportState};
use parley_proto::MessageId;

use crate::{
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_client::SimClient,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

type EventQueue = Arc<Mutex<VecDeque<AppEvent>>>;

fn lock(queue: &EventQueue) -> MutexGuard<'_, VecDeque<AppEvent>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    client: SimClient,
    credential: String,
    /// Bridge output and injected events
    events: EventQueue,
    /// Last state reported to the App
    reported: TransportState,
    renders: usize,
    scrolled: Vec<MessageId>,
    invariants: Option<InvariantRegistry>,
}

impl SimDriver {
    /// Driver connecting `client` with `credential`.
    pub fn new(client: SimClient, credential: impl Into<String>) -> Self {
        Self {
            client,
            credential: credential.into(),
            events: Arc::default(),
            reported: TransportState::Disconnected,
            renders: 0,
            scrolled: Vec::new(),
            invariants: None,
        }
    }

    /// Check invariants on every render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        lock(&self.events).push_back(event);
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        !lock(&self.events).is_empty() || self.client.state() != self.reported
    }

    /// Simulated connection.
    pub fn client(&self) -> &SimClient {
        &self.client
    }

    /// Simulated connection, for fault injection.
    pub fn client_mut(&mut self) -> &mut SimClient {
        &mut self.client
    }

    /// Renders so far.
    pub fn renders(&self) -> usize {
        self.renders
    }

    /// Messages scrolled to, in order.
    pub fn scrolled(&self) -> &[MessageId] {
        &self.scrolled
    }

    /// Snapshot of the simulated connection.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot::from_client(0, &self.client))
    }

    /// Check invariants against the current state.
    pub fn check_invariants(&self, context: &str) {
        if let Some(registry) = &self.invariants {
            registry.assert_all(&self.snapshot(), context);
        }
    }

    fn next_event(&mut self) -> Option<AppEvent> {
        self.client.pump();
        let state = self.client.state();
        if state != self.reported {
            self.reported = state;
            return Some(AppEvent::ConnectionChanged(state));
        }
        lock(&self.events).pop_front()
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        Ok(self.next_event())
    }

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.client.connect(&self.credential).map_err(|e| SimDriverError(e.to_string()))
    }

    async fn subscribe(&mut self, topic: TopicKey) -> Result<SubscriptionToken, Self::Error> {
        let events = Arc::clone(&self.events);
        let handler = Bridge::handler(topic, move |event| lock(&events).push_back(event));
        Ok(self.client.subscribe(topic, handler))
    }

    async fn unsubscribe(&mut self, token: SubscriptionToken) -> Result<bool, Self::Error> {
        Ok(self.client.unsubscribe(token))
    }

    async fn send_room_message(&mut self, room: RoomId, content: &str) -> Result<bool, Self::Error> {
        Ok(self.client.send_room_message(room, content))
    }

    fn scroll_to(&mut self, message_id: MessageId) {
        self.scrolled.push(message_id);
    }

    fn render(&mut self, _app: &App) -> Result<(), Self::Error> {
        self.renders += 1;
        self.check_invariants("after render");
        Ok(())
    }

    fn stop(&mut self) {
        self.client.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use parley_client::TransportConfig;

    use super::*;
    use crate::{SimBroker, SimEnv, create_shared_broker};

    fn driver(token: &str) -> SimDriver {
        let broker = create_shared_broker(SimBroker::new());
        let client = SimClient::new(SimEnv::new(), broker, TransportConfig::default());
        SimDriver::new(client, token).with_invariants(InvariantRegistry::standard())
    }

    #[tokio::test]
    async fn connection_changes_become_events() {
        let mut driver = driver("token");
        driver.connect().await.unwrap();

        assert_eq!(
            driver.poll_event().await.unwrap(),
            Some(AppEvent::ConnectionChanged(TransportState::Connected))
        );
        assert_eq!(driver.poll_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn blank_credential_fails_connect() {
        let mut driver = driver("  ");
        assert!(driver.connect().await.is_err());
        assert!(!driver.has_pending());
    }

    #[tokio::test]
    async fn injected_events_are_polled_in_order() {
        let mut driver = driver("token");
        driver.inject_event(AppEvent::Tick);
        driver.inject_event(AppEvent::RoomsChanged);

        assert_eq!(driver.poll_event().await.unwrap(), Some(AppEvent::Tick));
        assert_eq!(driver.poll_event().await.unwrap(), Some(AppEvent::RoomsChanged));
    }
}
