//! STOMP commands.

use std::{fmt, str::FromStr};

use crate::errors::ProtocolError;

/// STOMP 1.2 frame command.
///
/// Client frames: `CONNECT`/`STOMP`, `SEND`, `SUBSCRIBE`, `UNSUBSCRIBE`,
/// `DISCONNECT`. Server frames: `CONNECTED`, `MESSAGE`, `RECEIPT`, `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Open a session
    Connect,
    /// Alias of `CONNECT` introduced in STOMP 1.2
    Stomp,
    /// Session accepted
    Connected,
    /// Publish to a destination
    Send,
    /// Start receiving from a destination
    Subscribe,
    /// Stop receiving from a subscription
    Unsubscribe,
    /// Graceful session close
    Disconnect,
    /// Message delivered for a subscription
    Message,
    /// Acknowledgement of a frame that carried a `receipt` header
    Receipt,
    /// Broker-side error; the broker closes the socket afterwards
    Error,
}

impl Command {
    /// Wire spelling of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Whether header values of this command are escaped on the wire.
    ///
    /// STOMP 1.2 exempts the handshake frames so that 1.0 peers can still
    /// negotiate.
    pub fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }
}
