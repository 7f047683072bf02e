//! Deterministic simulation harness for Parley.
//!
//! In-process implementations of the clock, the broker and the socket so the
//! real client and app run without a network, reproducibly.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual clock implementing the `Environment` trait
//! - [`SimBroker`]: STOMP broker speaking frames in memory
//! - [`SimClient`]: a real `ChatClient` wired to the broker, with fault
//!   injection
//! - [`SimDriver`]: `Driver` implementation so the app `Runtime` runs
//!   against the simulation
//! - [`MemoryChatApi`]: `ChatApi` backed by memory
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of subscription
//! intent. Operations are applied to both the model and a [`SimClient`], and
//! their observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold on every path.
//! Use [`InvariantRegistry::standard()`] for the subscription invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod memory_api;
pub mod model;
pub mod sim_broker;
pub mod sim_client;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    BrokerMatchesLive, ClientSnapshot, Invariant, InvariantRegistry, InvariantResult,
    LiveMatchesDesired, NoDuplicateBrokerSubscriptions, SystemSnapshot, Violation,
};
pub use memory_api::MemoryChatApi;
pub use model::{
    ModelHandler, ModelTopic, ModelWorld, ObservableState, Operation, OperationResult, topic_key,
};
pub use sim_broker::{ConnectionId, SharedBroker, SimBroker, create_shared_broker, lock_broker};
pub use sim_client::SimClient;
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
