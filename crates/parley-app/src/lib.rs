//! Application layer for Parley
//!
//! Pure state machines and generic runtime for the chat views, enabling
//! deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`App`]: UI state machine (room list, active room, commands)
//! - [`RoomView`]: room-scoped view controller (history, live merge, jumps)
//! - [`Bridge`]: Protocol bridge (translates broker deliveries to App events)
//! - [`ChatApi`]: REST collaborator; [`HttpChatApi`] with the `http` feature
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Runtime`]: Generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
pub mod api;
mod app;
mod bridge;
mod driver;
mod event;
#[cfg(feature = "http")]
mod http;
pub mod input;
mod room_view;
mod rooms;
mod runtime;
mod state;

pub use action::{AppAction, PageKind};
pub use api::{ApiError, ChatApi, FileUpload, PageQuery};
pub use app::{App, SEND_FAILED};
pub use bridge::Bridge;
pub use driver::Driver;
pub use event::AppEvent;
#[cfg(feature = "http")]
pub use http::{API_PREFIX, HttpChatApi};
pub use input::{InputError, parse_line};
pub use room_view::{
    DEFAULT_MAX_JUMP_ATTEMPTS, DEFAULT_PAGE_SIZE, NOT_FOUND_NOTICE, RoomView, ViewConfig,
};
pub use rooms::RoomList;
pub use runtime::{RETRY_HINT, Runtime};
pub use state::ViewStatus;
