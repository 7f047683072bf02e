//! Client events and actions.

use std::time::Duration;

use parley_core::{SocketId, TransportState};
use parley_proto::{Frame, Payload};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting socket lifecycle (opened, closed, failed)
/// - Decoding inbound bytes into frames and heartbeats
/// - Driving time forward via ticks
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Socket requested by [`ClientAction::OpenSocket`] is open.
    SocketOpened {
        /// Attempt identifier from the action
        socket: SocketId,
    },

    /// Socket closed or failed to open.
    SocketClosed {
        /// Attempt identifier from the action
        socket: SocketId,
        /// Close reason or error text
        reason: String,
    },

    /// Frame received from the broker.
    FrameReceived(Frame),

    /// Bare end-of-line heartbeat received from the broker.
    HeartbeatReceived,

    /// Time tick for reconnect backoff and heartbeats.
    ///
    /// The caller should tick at least every few hundred milliseconds.
    Tick,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Open a WebSocket to `url`; report back with `socket`.
    OpenSocket {
        /// Attempt identifier
        socket: SocketId,
        /// Endpoint URL
        url: String,
    },

    /// Write a frame to the current socket.
    Send(Frame),

    /// Write a bare end-of-line heartbeat.
    SendHeartbeat,

    /// Close a socket.
    CloseSocket {
        /// Socket to close
        socket: SocketId,
        /// Human-readable reason
        reason: String,
    },

    /// Make sure a tick arrives after `after`.
    ScheduleWakeup {
        /// Delay
        after: Duration,
    },

    /// Connection state changed.
    StatusChanged(TransportState),

    /// Broker answered the liveness probe.
    LivenessReply(Payload),

    /// Broker sent an ERROR frame.
    BrokerError {
        /// Broker message
        message: String,
    },
}
