//! Parley wire protocol
//!
//! Text frames exchanged with the chat broker over a WebSocket. The broker
//! speaks STOMP 1.2: a command line, `key:value` headers, a blank line, a body
//! and a NUL terminator. A lone end-of-line between frames is a heartbeat.
//!
//! # Components
//!
//! - [`Frame`]: one STOMP frame (command, headers, body) with encode/decode
//! - [`FrameDecoder`]: streaming decoder tolerant of arbitrary chunking
//! - [`TopicKey`]: logical topic identity, mapped to broker destinations
//! - [`Payload`]: inbound body, parsed JSON or the raw text as a fallback
//! - [`payloads::chat`]: typed chat bodies (messages, receipts, room events)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod decoder;
pub mod destination;
pub mod errors;
mod frame;
pub mod payloads;

pub use command::Command;
pub use decoder::{FrameDecoder, Inbound};
pub use destination::{MessageId, RoomId, TopicKey, UserId};
pub use errors::{ProtocolError, Result};
pub use frame::{Frame, MAX_FRAME_SIZE};
pub use payloads::Payload;
