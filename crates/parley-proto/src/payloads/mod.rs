//! Frame bodies.
//!
//! Inbound bodies are JSON in practice but the broker makes no promise, so
//! decoding never fails: anything that does not parse is kept as text. Typed
//! views over a parsed body live in [`chat`].

pub mod chat;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    Frame,
    errors::{ProtocolError, Result},
};

/// Inbound frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON
    Parsed(Value),
    /// Body that is not JSON, passed through unchanged (lossy UTF-8)
    Raw(String),
}

impl Payload {
    /// Interpret a raw body.
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => Self::Parsed(value),
            Err(_) => Self::Raw(String::from_utf8_lossy(body).into_owned()),
        }
    }

    /// Interpret a frame's body.
    pub fn from_frame(frame: &Frame) -> Self {
        Self::decode(&frame.body)
    }

    /// Parsed JSON value. `None` for raw text.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Raw text. `None` for parsed JSON.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Parsed(_) => None,
            Self::Raw(text) => Some(text),
        }
    }

    /// Deserialize a parsed body into `T`.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Serialization` if the body is raw text or does not
    /// match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Parsed(value) => Ok(T::deserialize(value)?),
            Self::Raw(_) => Err(ProtocolError::Serialization("body is not JSON".to_string())),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Parsed(value)
    }
}
