//! Broker destinations and topic keys.
//!
//! A [`TopicKey`] names a logical stream the application cares about. Each
//! key maps to exactly one broker destination and back. Keys are `Copy` and
//! ordered so registries can use them directly as map keys.

use std::{fmt, str::FromStr};

use crate::errors::ProtocolError;

/// Room identifier.
pub type RoomId = u64;

/// Message identifier. Server-assigned, increasing within a room.
pub type MessageId = u64;

/// User identifier.
pub type UserId = u64;

/// WebSocket endpoint path on the chat server.
pub const ENDPOINT_PATH: &str = "/ws-chat";

/// Per-user queue announcing room list changes.
pub const ROOMS_QUEUE: &str = "/user/queue/rooms";

/// Per-user queue answering liveness probes.
pub const PING_QUEUE: &str = "/user/queue/ping";

/// Application destination for liveness probes.
pub const PING_DESTINATION: &str = "/app/ping";

/// Application destination for outbound chat messages.
pub const CHAT_SEND_DESTINATION: &str = "/app/chat/send";

const ROOM_TOPIC_PREFIX: &str = "/topic/room/";
const READ_SUFFIX: &str = "/read";

/// Logical topic identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopicKey {
    /// Room list change notifications for the current user
    RoomsIndex,
    /// New messages in a room
    Room(RoomId),
    /// Read receipts in a room
    RoomRead(RoomId),
}

impl TopicKey {
    /// Broker destination for this topic.
    pub fn destination(&self) -> String {
        match self {
            Self::RoomsIndex => ROOMS_QUEUE.to_string(),
            Self::Room(id) => format!("{ROOM_TOPIC_PREFIX}{id}"),
            Self::RoomRead(id) => format!("{ROOM_TOPIC_PREFIX}{id}{READ_SUFFIX}"),
        }
    }

    /// Topic for a broker destination.
    ///
    /// # Errors
    ///
    /// `ProtocolError::UnknownDestination` if the destination is not one of
    /// the chat topics.
    pub fn from_destination(destination: &str) -> Result<Self, ProtocolError> {
        if destination == ROOMS_QUEUE {
            return Ok(Self::RoomsIndex);
        }

        let unknown = || ProtocolError::UnknownDestination(destination.to_string());
        let rest = destination.strip_prefix(ROOM_TOPIC_PREFIX).ok_or_else(unknown)?;
        match rest.strip_suffix(READ_SUFFIX) {
            Some(id) => id.parse().map(Self::RoomRead).map_err(|_| unknown()),
            None => rest.parse().map(Self::Room).map_err(|_| unknown()),
        }
    }

    /// Room this topic belongs to. `None` for the rooms index.
    pub fn room(&self) -> Option<RoomId> {
        match self {
            Self::RoomsIndex => None,
            Self::Room(id) | Self::RoomRead(id) => Some(*id),
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomsIndex => f.write_str("rooms-index"),
            Self::Room(id) => write!(f, "room:{id}"),
            Self::RoomRead(id) => write!(f, "room:{id}:read"),
        }
    }
}

impl FromStr for TopicKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ProtocolError::UnknownDestination(s.to_string());
        if s == "rooms-index" {
            return Ok(Self::RoomsIndex);
        }
        let rest = s.strip_prefix("room:").ok_or_else(unknown)?;
        match rest.strip_suffix(":read") {
            Some(id) => id.parse().map(Self::RoomRead).map_err(|_| unknown()),
            None => rest.parse().map(Self::Room).map_err(|_| unknown()),
        }
    }
}
