//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the interactive
//! state of the application completely decoupled from I/O and protocol
//! mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Tracks the room list, unread counters and the rooms-queue subscription.
//! - Owns the [`RoomView`] of the active room and routes room events to it.
//! - Tracks the shared connection state for UI feedback.

use parley_client::{SubscriptionToken, TransportState};
use parley_proto::{RoomId, UserId};

use crate::{AppAction, AppEvent, RoomList, RoomView, ViewConfig};

/// Status shown when a message could not be handed to the broker.
pub const SEND_FAILED: &str = "socket disconnected, message not sent";

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Shared broker connection state.
    connection: TransportState,
    /// Rooms, newest activity first.
    rooms: RoomList,
    /// Active room.
    view: RoomView,
    /// Rooms-queue subscription, once registered.
    rooms_token: Option<SubscriptionToken>,
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
    /// Last room list failure.
    rooms_error: Option<String>,
    /// Room to open at startup instead of the newest one
    initial_room: Option<RoomId>,
}

impl App {
    /// Create an App with no rooms loaded.
    pub fn new(config: ViewConfig) -> Self {
        Self {
            connection: TransportState::Disconnected,
            rooms: RoomList::new(),
            view: RoomView::new(config),
            rooms_token: None,
            status_message: None,
            rooms_error: None,
            initial_room: None,
        }
    }

    /// Actions to run once at startup.
    ///
    /// With an initial room set, that room is entered right away and the
    /// room list no longer picks one.
    pub fn start(&mut self) -> Vec<AppAction> {
        let mut actions = vec![AppAction::Connect, AppAction::SubscribeRooms, AppAction::LoadRooms];
        if let Some(room) = self.initial_room.take() {
            actions.extend(self.view.enter(room));
        }
        if !actions.contains(&AppAction::Render) {
            actions.push(AppAction::Render);
        }
        actions
    }

    /// Open `room` at startup instead of the most recently active room.
    pub fn set_initial_room(&mut self, room: Option<RoomId>) {
        self.initial_room = room;
    }

    /// Set our own user id so our read receipts are not shown as the other
    /// side's.
    pub fn set_local_user(&mut self, user: Option<UserId>) {
        self.view.set_local_user(user);
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        let actions = self.dispatch(event);
        for action in &actions {
            if let AppAction::UpdateRead { room, .. } = action {
                self.rooms.mark_read(*room);
            }
        }
        actions
    }

    fn dispatch(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Tick => vec![],
            AppEvent::ConnectionChanged(state) => {
                if self.connection == state {
                    return vec![];
                }
                tracing::debug!(?state, "connection changed");
                self.connection = state;
                vec![AppAction::Render]
            },
            AppEvent::RoomsLoaded(Ok(rooms)) => {
                self.rooms.replace(rooms);
                self.rooms_error = None;
                let mut actions = match (self.view.room(), self.rooms.first()) {
                    (None, Some(first)) => self.view.enter(first),
                    _ => vec![],
                };
                actions.push(AppAction::Render);
                actions
            },
            AppEvent::RoomsLoaded(Err(message)) => {
                tracing::warn!(%message, "room list failed");
                self.rooms_error = Some(message);
                vec![AppAction::Render]
            },
            AppEvent::RoomsSubscribed(token) => {
                self.rooms_token = Some(token);
                vec![]
            },
            AppEvent::RoomsChanged => vec![AppAction::LoadRooms],
            AppEvent::SelectRoom(room) => {
                self.status_message = None;
                self.view.enter(room)
            },
            AppEvent::PageLoaded { room, kind, result } => self.view.page_loaded(room, kind, result),
            AppEvent::MetaLoaded { room, result } => self.view.meta_loaded(room, result),
            AppEvent::RoomSubscribed { room, tokens } => self.view.subscribed(room, tokens),
            AppEvent::LiveMessage { room, message } => {
                let known = self.rooms.bump(room, &message);
                if self.view.room() != Some(room) {
                    self.rooms.add_unread(room);
                    return if known { vec![AppAction::Render] } else { vec![AppAction::LoadRooms] };
                }
                let mut actions = self.view.live_message(room, message);
                if !actions.contains(&AppAction::Render) {
                    actions.push(AppAction::Render);
                }
                actions
            },
            AppEvent::ReadReceipt { room, receipt } => self.view.read_receipt(room, &receipt),
            AppEvent::SendRequested { content } => self.send(content),
            AppEvent::MessageSent { room, sent } => {
                if sent {
                    return vec![];
                }
                self.status_message = Some(SEND_FAILED.to_string());
                if self.view.room() == Some(room) {
                    self.view.set_error(SEND_FAILED);
                }
                vec![AppAction::Render]
            },
            AppEvent::JumpTo { message_id } => self.view.jump_to(message_id),
            AppEvent::DeleteRequested { room } => {
                self.status_message = Some(format!("deleting room {room}..."));
                vec![AppAction::DeleteRoom { room }, AppAction::Render]
            },
            AppEvent::RoomDeleted { room, result: Ok(()) } => {
                self.rooms.remove(room);
                self.status_message = Some(format!("room {room} deleted"));
                let mut actions = vec![];
                if self.view.room() == Some(room) {
                    actions.extend(self.view.leave());
                    if let Some(next) = self.rooms.first() {
                        actions.extend(self.view.enter(next));
                    }
                }
                actions.push(AppAction::Render);
                actions
            },
            AppEvent::RoomDeleted { room, result: Err(message) } => {
                tracing::warn!(room_id = room, %message, "delete failed");
                self.status_message = Some(format!("delete failed: {message}"));
                vec![AppAction::Render]
            },
            AppEvent::Quit => {
                let mut tokens = self.view.tokens().to_vec();
                tokens.extend(self.rooms_token.take());
                let mut actions = vec![];
                if !tokens.is_empty() {
                    actions.push(AppAction::Unsubscribe { tokens });
                }
                actions.push(AppAction::Quit);
                actions
            },
        }
    }

    fn send(&mut self, content: String) -> Vec<AppAction> {
        let Some(room) = self.view.room() else {
            self.status_message = Some("select a room first".to_string());
            return vec![AppAction::Render];
        };
        if content.trim().is_empty() {
            return vec![];
        }
        self.view.clear_messages();
        self.status_message = None;
        vec![AppAction::SendMessage { room, content }]
    }

    /// Set a status message to display to the user.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Shared broker connection state.
    pub fn connection(&self) -> TransportState {
        self.connection
    }

    /// Room list.
    pub fn rooms(&self) -> &RoomList {
        &self.rooms
    }

    /// Active room view.
    pub fn view(&self) -> &RoomView {
        &self.view
    }

    /// Active room id.
    pub fn active_room(&self) -> Option<RoomId> {
        self.view.room()
    }

    /// Rooms-queue subscription.
    pub fn rooms_token(&self) -> Option<SubscriptionToken> {
        self.rooms_token
    }

    /// Status message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Last room list failure.
    pub fn rooms_error(&self) -> Option<&str> {
        self.rooms_error.as_deref()
    }
}
