//! Error types for the Parley core.
//!
//! Session errors describe why a transport operation was refused or why a
//! connection was dropped. Handler errors are whatever a subscriber's
//! callback chooses to return; the registry only logs them.

use std::{io, time::Duration};

use parley_proto::{Command, ProtocolError};
use thiserror::Error;

use crate::transport::TransportState;

/// Error a subscription handler may return. Logged and otherwise ignored.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the transport session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `connect` was called without a usable bearer credential
    #[error("no credential available; connection attempt skipped")]
    MissingCredential,

    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: TransportState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Broker sent a frame that makes no sense in the current state
    #[error("unexpected {command} frame in state {state:?}")]
    UnexpectedFrame {
        /// State when the frame arrived
        state: TransportState,
        /// Command of the frame
        command: Command,
    },

    /// Broker reported an error and is closing the session
    #[error("broker error: {0}")]
    Broker(String),

    /// `CONNECTED` did not arrive in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Broker stopped sending heartbeats
    #[error("heartbeat timeout after {elapsed:?}")]
    HeartbeatTimeout {
        /// Silence observed
        elapsed: Duration,
    },

    /// Frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying socket failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Returns true if a reconnect may succeed.
    ///
    /// Timeouts and socket failures are transient. A missing credential or a
    /// protocol violation will fail again on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::HeartbeatTimeout { .. } | Self::Transport(_)
        )
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        assert!(
            SessionError::HandshakeTimeout { elapsed: Duration::from_secs(31) }.is_transient()
        );
        assert!(SessionError::HeartbeatTimeout { elapsed: Duration::from_secs(21) }.is_transient());
        assert!(SessionError::Transport("reset".to_string()).is_transient());
    }

    #[test]
    fn refusals_are_fatal() {
        assert!(!SessionError::MissingCredential.is_transient());
        assert!(!SessionError::Broker("bad token".to_string()).is_transient());
        assert!(
            !SessionError::UnexpectedFrame {
                state: TransportState::Disconnected,
                command: Command::Message,
            }
            .is_transient()
        );
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SessionError = ProtocolError::MissingTerminator.into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
