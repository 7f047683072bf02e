//! Line-oriented terminal client for Parley.
//!
//! Reads commands and messages from stdin and prints the active room as a
//! running transcript. The App state machine, REST client and connection
//! manager are the same ones the simulation harness drives.
//!
//! # Components
//!
//! - [`CliDriver`]: `Driver` over a spawned chat client, stdin and stdout
//! - [`Transcript`]: turns successive App states into printable lines

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod transcript;

pub use driver::{CliDriver, CliError};
pub use transcript::Transcript;
