//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.
//! REST work goes to [`crate::ChatApi`]; live work goes to the
//! [`crate::Driver`].

use parley_client::SubscriptionToken;
use parley_proto::{MessageId, RoomId};

/// Which end of the history a page request reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Most recent messages; replaces the view
    Latest,
    /// Messages strictly older than `before`; merged into the view
    Older,
}

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Open the shared broker connection.
    Connect,

    /// Fetch the room list.
    LoadRooms,

    /// Watch the per-user rooms queue.
    SubscribeRooms,

    /// Fetch one page of history.
    FetchPage {
        /// Room to read
        room: RoomId,
        /// Page position
        kind: PageKind,
        /// Exclusive upper bound for [`PageKind::Older`]
        before: Option<MessageId>,
        /// Page size
        limit: usize,
    },

    /// Fetch the room's read state.
    LoadMeta {
        /// Room to read
        room: RoomId,
    },

    /// Subscribe to the room's message and read-receipt topics.
    SubscribeRoom {
        /// Room to watch
        room: RoomId,
    },

    /// Release these handlers.
    Unsubscribe {
        /// Tokens returned by earlier subscriptions
        tokens: Vec<SubscriptionToken>,
    },

    /// Tell the server how far the user has read. Best effort.
    UpdateRead {
        /// Room read
        room: RoomId,
        /// Newest message shown
        last_read: MessageId,
    },

    /// Publish a chat message over the broker.
    SendMessage {
        /// Target room
        room: RoomId,
        /// Raw user input
        content: String,
    },

    /// Delete a room on the server.
    DeleteRoom {
        /// Room to delete
        room: RoomId,
    },

    /// Bring a loaded message into view.
    ScrollTo {
        /// Message to show
        message_id: MessageId,
    },
}
