//! Operations for model-based testing.
//!
//! Operations represent everything a caller or the network can do to one
//! client. They are generated randomly by proptest and applied to both the
//! model and the real implementation.

use parley_proto::TopicKey;

/// Compact topic index (kept small so operations collide on topics).
pub type ModelTopic = u8;

/// Topic for a model index: rooms index, three rooms, their read topics.
pub fn topic_key(topic: ModelTopic) -> TopicKey {
    match topic % 7 {
        0 => TopicKey::RoomsIndex,
        n @ 1..=3 => TopicKey::Room(u64::from(n)),
        n => TopicKey::RoomRead(u64::from(n - 3)),
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Connect with a valid token.
    Connect,

    /// Connect with a blank token.
    ConnectWithoutToken,

    /// Explicit full teardown.
    Disconnect,

    /// Register a new handler.
    Subscribe {
        /// Target topic
        topic: ModelTopic,
    },

    /// Release a previously returned token.
    Unsubscribe {
        /// Index into the handlers registered so far (wraps)
        slot: u8,
    },

    /// The broker publishes one message on a topic.
    Publish {
        /// Target topic
        topic: ModelTopic,
    },

    /// The client sends a chat message; the broker echoes it to the room.
    SendMessage {
        /// Room 1..=3 (wraps)
        room: u8,
        /// Send whitespace only
        blank: bool,
    },

    /// The socket dies.
    DropConnection,

    /// New sockets cannot reach the broker.
    Partition,

    /// New sockets reach the broker again.
    Heal,

    /// Advance virtual time.
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation had no result to compare.
    Ok,

    /// Connect refused (no credential).
    Rejected,

    /// Outcome of a send.
    Sent(bool),

    /// Outcome of an unsubscribe.
    Unsubscribed(bool),
}
