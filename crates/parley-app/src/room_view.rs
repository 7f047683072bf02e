//! Room-scoped view controller.
//!
//! [`RoomView`] owns everything the UI shows for the active conversation:
//! the loaded messages, the de-duplication set, the live subscription tokens
//! and any pending "jump to message" search. It is a pure state machine; REST
//! results and live deliveries come in as method calls and the work it needs
//! done goes out as [`AppAction`]s.
//!
//! Every result carries the room it was requested for. Results for a room
//! that is no longer active are dropped, and a late subscription for such a
//! room is released immediately.

use std::collections::HashSet;

use parley_client::SubscriptionToken;
use parley_proto::{
    MessageId, RoomId, UserId,
    payloads::chat::{ChatMessage, ReadReceipt, RoomMeta},
};

use crate::{AppAction, PageKind, ViewStatus};

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Default number of older pages fetched while looking for a message.
pub const DEFAULT_MAX_JUMP_ATTEMPTS: u32 = 8;

/// Notice shown when a jump gives up.
pub const NOT_FOUND_NOTICE: &str = "message not found, may be older";

/// View tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    /// Messages per page
    pub page_size: usize,
    /// Older pages fetched per jump before giving up
    pub max_jump_attempts: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, max_jump_attempts: DEFAULT_MAX_JUMP_ATTEMPTS }
    }
}

/// Search for a message older than everything loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Jump {
    target: MessageId,
    /// Older pages requested so far, including the one in flight
    attempts: u32,
}

/// State of the active room.
#[derive(Debug, Clone, Default)]
pub struct RoomView {
    config: ViewConfig,
    /// Our own user id, to tell our read receipts from the other side's
    local_user: Option<UserId>,
    room: Option<RoomId>,
    status: ViewStatus,
    /// Sorted by message id, oldest first
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
    /// Live subscriptions held for `room`
    tokens: Vec<SubscriptionToken>,
    subscribe_requested: bool,
    /// Newest id reported through `UpdateRead`
    read_reported: Option<MessageId>,
    other_last_read: Option<MessageId>,
    jump: Option<Jump>,
    notice: Option<String>,
    error: Option<String>,
}

impl RoomView {
    /// Idle view.
    pub fn new(config: ViewConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Set the local user id used to filter read receipts.
    pub fn set_local_user(&mut self, user: Option<UserId>) {
        self.local_user = user;
    }

    /// Switch to `room`.
    ///
    /// Releases the previous room's own subscriptions, resets the view and
    /// requests the latest page and the read state. Re-entering the active
    /// room does nothing.
    pub fn enter(&mut self, room: RoomId) -> Vec<AppAction> {
        if self.room == Some(room) {
            return Vec::new();
        }

        let mut actions = self.release();
        self.reset();
        self.room = Some(room);
        self.status = ViewStatus::Loading;
        tracing::debug!(room_id = room, "entering room");

        actions.push(AppAction::FetchPage {
            room,
            kind: PageKind::Latest,
            before: None,
            limit: self.config.page_size,
        });
        actions.push(AppAction::LoadMeta { room });
        actions.push(AppAction::Render);
        actions
    }

    /// Stop viewing the active room.
    pub fn leave(&mut self) -> Vec<AppAction> {
        let mut actions = self.release();
        if self.room.take().is_some() {
            actions.push(AppAction::Render);
        }
        self.reset();
        actions
    }

    /// A history page arrived.
    pub fn page_loaded(
        &mut self,
        room: RoomId,
        kind: PageKind,
        result: Result<Vec<ChatMessage>, String>,
    ) -> Vec<AppAction> {
        if self.room != Some(room) {
            tracing::debug!(room_id = room, ?kind, "stale page dropped");
            return Vec::new();
        }

        let mut actions = match kind {
            PageKind::Latest => self.latest_loaded(room, result),
            PageKind::Older => self.older_loaded(room, result),
        };
        actions.extend(self.report_read(room));
        actions.push(AppAction::Render);
        actions
    }

    fn latest_loaded(
        &mut self,
        room: RoomId,
        result: Result<Vec<ChatMessage>, String>,
    ) -> Vec<AppAction> {
        self.messages.clear();
        self.seen.clear();
        match result {
            Ok(page) => {
                tracing::debug!(room_id = room, count = page.len(), "latest page loaded");
                self.merge(page);
                self.status = ViewStatus::Ready;
            },
            Err(message) => {
                tracing::warn!(room_id = room, %message, "latest page failed");
                self.status = ViewStatus::Error(message);
            },
        }

        // live updates still flow after a failed load
        if self.subscribe_requested {
            return Vec::new();
        }
        self.subscribe_requested = true;
        vec![AppAction::SubscribeRoom { room }]
    }

    fn older_loaded(
        &mut self,
        room: RoomId,
        result: Result<Vec<ChatMessage>, String>,
    ) -> Vec<AppAction> {
        let page = match result {
            Ok(page) => page,
            Err(message) => {
                tracing::warn!(room_id = room, %message, "older page failed");
                if self.jump.take().is_some() {
                    self.error = Some(message);
                }
                return Vec::new();
            },
        };

        if !self.status.accepts_live() {
            tracing::debug!(room_id = room, "older page before history dropped");
            self.jump = None;
            return Vec::new();
        }
        let exhausted = page.is_empty();
        self.merge(page);

        // a live delivery may have satisfied the jump while this page was in flight
        let Some(mut jump) = self.jump.take() else {
            tracing::debug!(room_id = room, "older page merged after jump ended");
            return Vec::new();
        };

        if self.seen.contains(&jump.target) {
            return vec![AppAction::ScrollTo { message_id: jump.target }];
        }
        if exhausted || jump.attempts >= self.config.max_jump_attempts {
            tracing::debug!(target = jump.target, attempts = jump.attempts, "jump gave up");
            self.notice = Some(NOT_FOUND_NOTICE.to_string());
            return Vec::new();
        }

        jump.attempts += 1;
        self.jump = Some(jump);
        vec![AppAction::FetchPage {
            room,
            kind: PageKind::Older,
            before: self.oldest_id(),
            limit: self.config.page_size,
        }]
    }

    /// Live subscription tokens arrived for `room`.
    pub fn subscribed(&mut self, room: RoomId, tokens: Vec<SubscriptionToken>) -> Vec<AppAction> {
        if self.room != Some(room) {
            tracing::debug!(room_id = room, "subscription for inactive room released");
            return if tokens.is_empty() { Vec::new() } else { vec![AppAction::Unsubscribe { tokens }] };
        }
        self.tokens.extend(tokens);
        Vec::new()
    }

    /// A message arrived on a room topic.
    pub fn live_message(&mut self, room: RoomId, message: ChatMessage) -> Vec<AppAction> {
        if self.room != Some(room) || !self.status.accepts_live() {
            return Vec::new();
        }
        let id = message.message_id;
        if !self.seen.insert(id) {
            tracing::trace!(room_id = room, message_id = id, "duplicate message dropped");
            return Vec::new();
        }
        self.insert_sorted(message);

        let mut actions = Vec::new();
        if self.jump.is_some_and(|jump| jump.target == id) {
            self.jump = None;
            actions.push(AppAction::ScrollTo { message_id: id });
        }
        actions.extend(self.report_read(room));
        actions.push(AppAction::Render);
        actions
    }

    /// Read state arrived.
    pub fn meta_loaded(&mut self, room: RoomId, result: Result<RoomMeta, String>) -> Vec<AppAction> {
        if self.room != Some(room) {
            return Vec::new();
        }
        match result {
            Ok(meta) => self.advance_other_read(meta.other_last_read_message_id),
            Err(message) => tracing::debug!(room_id = room, %message, "room meta unavailable"),
        }
        vec![AppAction::Render]
    }

    /// A read receipt arrived.
    pub fn read_receipt(&mut self, room: RoomId, receipt: &ReadReceipt) -> Vec<AppAction> {
        if self.room != Some(room) {
            return Vec::new();
        }
        if receipt.user_id.is_some() && receipt.user_id == self.local_user {
            return Vec::new();
        }
        self.advance_other_read(Some(receipt.last_read_message_id));
        vec![AppAction::Render]
    }

    /// Show `target`, paging back through history if it is not loaded.
    pub fn jump_to(&mut self, target: MessageId) -> Vec<AppAction> {
        let Some(room) = self.room else {
            return Vec::new();
        };
        if self.status != ViewStatus::Ready {
            self.notice = Some("history not loaded yet".to_string());
            return vec![AppAction::Render];
        }

        self.notice = None;
        if self.seen.contains(&target) {
            return vec![AppAction::ScrollTo { message_id: target }, AppAction::Render];
        }
        if self.jump.is_some() {
            tracing::debug!(target, "jump already in progress");
            return Vec::new();
        }

        let before = self.oldest_id();
        if before.is_none() || self.config.max_jump_attempts == 0 {
            self.notice = Some(NOT_FOUND_NOTICE.to_string());
            return vec![AppAction::Render];
        }

        self.jump = Some(Jump { target, attempts: 1 });
        vec![
            AppAction::FetchPage { room, kind: PageKind::Older, before, limit: self.config.page_size },
            AppAction::Render,
        ]
    }

    /// Set a room-scoped error, e.g. a failed send.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clear the room-scoped error and notice.
    pub fn clear_messages(&mut self) {
        self.error = None;
        self.notice = None;
    }

    /// Active room.
    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    /// Lifecycle state.
    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    /// Loaded messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Newest loaded message id.
    pub fn latest_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.message_id)
    }

    /// Soft notice, e.g. a jump that gave up.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Room-scoped error that did not discard loaded state.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Newest message the other participant has read.
    pub fn other_last_read(&self) -> Option<MessageId> {
        self.other_last_read
    }

    /// Whether the other participant has read `message_id`.
    pub fn is_read_by_other(&self, message_id: MessageId) -> bool {
        self.other_last_read.is_some_and(|read| message_id <= read)
    }

    /// Whether a jump is waiting for an older page.
    pub fn is_jumping(&self) -> bool {
        self.jump.is_some()
    }

    /// Live subscription tokens held for the active room.
    pub fn tokens(&self) -> &[SubscriptionToken] {
        &self.tokens
    }

    fn release(&mut self) -> Vec<AppAction> {
        let tokens = std::mem::take(&mut self.tokens);
        if tokens.is_empty() { Vec::new() } else { vec![AppAction::Unsubscribe { tokens }] }
    }

    fn reset(&mut self) {
        self.status = ViewStatus::Idle;
        self.messages.clear();
        self.seen.clear();
        self.subscribe_requested = false;
        self.read_reported = None;
        self.other_last_read = None;
        self.jump = None;
        self.notice = None;
        self.error = None;
    }

    fn merge(&mut self, page: Vec<ChatMessage>) {
        for message in page {
            if self.seen.insert(message.message_id) {
                self.insert_sorted(message);
            }
        }
    }

    fn insert_sorted(&mut self, message: ChatMessage) {
        let at = self.messages.partition_point(|m| m.message_id < message.message_id);
        self.messages.insert(at, message);
    }

    fn oldest_id(&self) -> Option<MessageId> {
        self.messages.first().map(|m| m.message_id)
    }

    fn advance_other_read(&mut self, read: Option<MessageId>) {
        if let Some(read) = read
            && self.other_last_read.is_none_or(|current| read > current)
        {
            self.other_last_read = Some(read);
        }
    }

    /// `UpdateRead` when the newest message changed since the last report.
    fn report_read(&mut self, room: RoomId) -> Option<AppAction> {
        let latest = self.latest_id()?;
        if self.read_reported == Some(latest) {
            return None;
        }
        self.read_reported = Some(latest);
        Some(AppAction::UpdateRead { room, last_read: latest })
    }
}
