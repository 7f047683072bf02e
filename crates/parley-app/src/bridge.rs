//! Protocol bridge between broker deliveries and the App.
//!
//! Drivers register the handlers built here with the client; every payload
//! the broker delivers on a topic becomes one [`AppEvent`] pushed into the
//! driver's event queue.

use parley_core::{Handler, HandlerError};
use parley_proto::{
    Payload, ProtocolError, TopicKey,
    payloads::chat::{ChatMessage, ReadReceipt, RoomsEvent},
};

use crate::AppEvent;

/// Translates topic deliveries into [`AppEvent`]s.
pub struct Bridge;

impl Bridge {
    /// Event for one delivery on `topic`.
    ///
    /// `Ok(None)` for payloads that need no reaction, such as rooms-queue
    /// events other than a change notice.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Serialization` if the payload does not match the
    /// topic's message shape.
    pub fn translate(topic: TopicKey, payload: &Payload) -> Result<Option<AppEvent>, ProtocolError> {
        match topic {
            TopicKey::Room(room) => {
                let mut message: ChatMessage = payload.deserialize()?;
                message.room_id.get_or_insert(room);
                Ok(Some(AppEvent::LiveMessage { room, message }))
            },
            TopicKey::RoomRead(room) => {
                let receipt: ReadReceipt = payload.deserialize()?;
                Ok(Some(AppEvent::ReadReceipt { room, receipt }))
            },
            TopicKey::RoomsIndex => {
                let event: RoomsEvent = payload.deserialize()?;
                Ok(event.is_rooms_changed().then_some(AppEvent::RoomsChanged))
            },
        }
    }

    /// Subscription handler feeding translated events to `sink`.
    ///
    /// Undecodable payloads fail the handler, which the registry logs without
    /// affecting other handlers.
    pub fn handler<F>(topic: TopicKey, mut sink: F) -> Handler
    where
        F: FnMut(AppEvent) + Send + 'static,
    {
        Box::new(move |payload: &Payload| -> Result<(), HandlerError> {
            if let Some(event) = Self::translate(topic, payload)? {
                sink(event);
            }
            Ok(())
        })
    }
}
