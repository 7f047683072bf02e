//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from the live
//! connection and the frontend. A production driver wraps a
//! [`parley_client::transport::ChatHandle`] and a terminal; the simulation
//! driver pumps a [`parley_client::ChatClient`] against an in-process broker.
//! REST calls are not part of the driver; they go to [`crate::ChatApi`].

use std::future::Future;

use parley_client::{RoomId, SubscriptionToken, TopicKey};
use parley_proto::MessageId;

use crate::{App, AppEvent};

/// Abstracts live I/O for the application runtime.
///
/// Deliveries on subscribed topics and connection state changes come back
/// through [`poll_event`](Driver::poll_event), typically translated by
/// [`crate::Bridge`].
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Poll for the next input event.
    ///
    /// Returns `None` if no event is ready.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, Self::Error>> + Send;

    /// Open the shared broker connection.
    ///
    /// Returns once the connection attempt has started; the outcome arrives
    /// as [`AppEvent::ConnectionChanged`].
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be started, e.g. a missing
    /// token.
    fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Register interest in `topic`. Deliveries arrive as events.
    ///
    /// Works while disconnected; the subscription is placed once connected.
    fn subscribe(
        &mut self,
        topic: TopicKey,
    ) -> impl Future<Output = Result<SubscriptionToken, Self::Error>> + Send;

    /// Release a subscription. `false` if the token was already released.
    fn unsubscribe(
        &mut self,
        token: SubscriptionToken,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Publish a chat message. `false` if it was not sent.
    fn send_room_message(
        &mut self,
        room: RoomId,
        content: &str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Bring a loaded message into view.
    fn scroll_to(&mut self, message_id: MessageId);

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Stop the connection and clean up resources.
    fn stop(&mut self);
}
