//! Client errors.

use parley_core::SessionError;
use parley_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client and its driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Transport session refused the operation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Frame could not be encoded or decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Endpoint configuration is unusable
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The client task has stopped
    #[error("chat client is shut down")]
    Closed,
}
