//! Reference model for model-based testing.
//!
//! The model tracks subscription intent and expected deliveries for a single
//! client without any transport. Tests apply the same operations to the
//! model and to a [`crate::SimClient`] and compare observable state.

mod operation;
mod world;

pub use operation::{ModelTopic, Operation, OperationResult, topic_key};
pub use world::{ModelHandler, ModelWorld, ObservableState};
