//! Client
//!
//! Chat connection manager: one broker session shared by every subscriber in
//! the application, with subscription intent that survives reconnects.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based patterns as
//! [`parley_core`]. [`ChatClient`] combines the transport session with the
//! subscription registry and the publish facade. It receives
//! [`ClientEvent`]s, processes them synchronously and queues
//! [`ClientAction`]s for the caller to execute.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::spawn`]: run a [`ChatClient`] on a tokio task with a real
//!   WebSocket
//! - [`transport::ChatHandle`]: cloneable handle shared by all subscribers
//! - [`transport::ChatConfig`]: endpoint configuration

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;

#[cfg(feature = "transport")]
mod system_env;
#[cfg(feature = "transport")]
pub mod transport;

pub use client::ChatClient;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use parley_core::{
    SocketId, SubscriptionToken, TransportConfig, TransportState, env::Environment,
};
pub use parley_proto::{MessageId, Payload, RoomId, TopicKey};
#[cfg(feature = "transport")]
pub use system_env::SystemEnv;
