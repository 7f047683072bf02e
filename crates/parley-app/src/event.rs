//! Application input events.
//!
//! This module defines [`AppEvent`], the inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from three sources:
//! - User input (room selection, message text, jump requests).
//! - Broker deliveries translated by [`crate::Bridge`].
//! - Results of REST calls and subscriptions run by [`crate::Runtime`].

use parley_client::{SubscriptionToken, TransportState};
use parley_proto::{
    MessageId, RoomId,
    payloads::chat::{ChatMessage, ReadReceipt, RoomMeta, RoomSummary},
};

use crate::PageKind;

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Periodic tick.
    Tick,

    /// Connection state changed.
    ConnectionChanged(TransportState),

    /// Room list fetched.
    RoomsLoaded(Result<Vec<RoomSummary>, String>),

    /// Rooms queue subscription registered.
    RoomsSubscribed(SubscriptionToken),

    /// Broker announced that the room list changed.
    RoomsChanged,

    /// User picked a room.
    SelectRoom(RoomId),

    /// History page fetched.
    PageLoaded {
        /// Room the page was requested for
        room: RoomId,
        /// Page position
        kind: PageKind,
        /// Messages or error text
        result: Result<Vec<ChatMessage>, String>,
    },

    /// Read state fetched.
    MetaLoaded {
        /// Room the meta was requested for
        room: RoomId,
        /// Meta or error text
        result: Result<RoomMeta, String>,
    },

    /// Room topics subscribed.
    RoomSubscribed {
        /// Room the subscription was requested for
        room: RoomId,
        /// One token per topic
        tokens: Vec<SubscriptionToken>,
    },

    /// Live message delivered.
    LiveMessage {
        /// Room topic it arrived on
        room: RoomId,
        /// Decoded message
        message: ChatMessage,
    },

    /// Live read receipt delivered.
    ReadReceipt {
        /// Room topic it arrived on
        room: RoomId,
        /// Decoded receipt
        receipt: ReadReceipt,
    },

    /// User submitted text for the active room.
    SendRequested {
        /// Raw input
        content: String,
    },

    /// Outcome of a send.
    MessageSent {
        /// Target room
        room: RoomId,
        /// Whether the frame was handed to the transport
        sent: bool,
    },

    /// User asked to show a specific message.
    JumpTo {
        /// Message to find
        message_id: MessageId,
    },

    /// User asked to delete a room.
    DeleteRequested {
        /// Room to delete
        room: RoomId,
    },

    /// Room deletion finished.
    RoomDeleted {
        /// Deleted room
        room: RoomId,
        /// Unit or error text
        result: Result<(), String>,
    },

    /// User asked to quit.
    Quit,
}
