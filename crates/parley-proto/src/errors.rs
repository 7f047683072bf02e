//! Protocol errors.
//!
//! Everything that can go wrong turning bytes into frames or frames into
//! bytes. Payload interpretation never fails here: an unparsable body becomes
//! [`crate::Payload::Raw`].

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by the frame codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line did not name a known STOMP command
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header line without a `:` separator
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Escape sequence not defined by STOMP 1.2
    #[error("invalid escape sequence \\{0} in header")]
    InvalidEscape(char),

    /// `content-length` header was not a non-negative integer
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Frame ended before the declared body or the NUL terminator
    #[error("frame truncated: expected {expected} body bytes, got {actual}")]
    FrameTruncated {
        /// Body length the frame claimed
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Body declared by `content-length` was not followed by NUL
    #[error("missing NUL terminator after body")]
    MissingTerminator,

    /// Frame exceeds the size limit
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Encoded or buffered size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Command line or header was not valid UTF-8
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// A header value cannot be represented on the wire
    #[error("header {name:?} cannot be encoded: {reason}")]
    UnencodableHeader {
        /// Header name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Destination string does not map to a known topic
    #[error("unrecognized destination: {0:?}")]
    UnknownDestination(String),

    /// JSON body serialization failed
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
