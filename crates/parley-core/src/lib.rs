//! Parley core
//!
//! Pure state machines behind the chat connection manager. Nothing here
//! performs I/O: methods take the current time and return actions for a
//! driver to execute, so the same logic runs against a real WebSocket and
//! inside the deterministic simulation harness.
//!
//! # Components
//!
//! - [`transport::TransportSession`]: STOMP session lifecycle, heartbeats and
//!   automatic reconnection
//! - [`registry::SubscriptionRegistry`]: desired subscriptions (handlers per
//!   topic) and the live broker subscriptions backing them
//! - [`reconcile`]: restores "live iff connected and wanted" for one topic or
//!   for all of them
//! - [`env::Environment`]: time source abstraction

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod transport;

pub use error::{HandlerError, SessionError};
pub use reconcile::{ReconcileOp, reconcile_all, reconcile_topic};
pub use registry::{
    DispatchReport, Handler, HandlerId, LiveSubscription, SubscriptionRegistry, SubscriptionToken,
};
pub use transport::{
    Heartbeats, SocketId, TransportAction, TransportConfig, TransportEvent, TransportSession,
    TransportState, TransportStep,
};
