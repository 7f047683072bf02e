//! In-memory chat REST API.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use parley_app::{ApiError, ChatApi, FileUpload, PageQuery};
use parley_proto::{
    MessageId, RoomId, UserId,
    payloads::chat::{ChatMessage, RoomMeta, RoomSummary, UploadResult},
};

#[derive(Debug, Default)]
struct State {
    rooms: Vec<RoomSummary>,
    /// Per room, sorted by id
    history: BTreeMap<RoomId, Vec<ChatMessage>>,
    my_reads: BTreeMap<RoomId, MessageId>,
    other_reads: BTreeMap<RoomId, MessageId>,
    failing: BTreeSet<RoomId>,
    pages: Vec<(RoomId, PageQuery)>,
    next_message: MessageId,
}

/// [`ChatApi`] backed by memory, for simulation.
///
/// Rooms listed in [`fail_room`](Self::fail_room) answer every room-scoped
/// call with HTTP 503.
#[derive(Debug)]
pub struct MemoryChatApi {
    user: UserId,
    state: Mutex<State>,
}

impl MemoryChatApi {
    /// Empty server acting for `user`.
    pub fn new(user: UserId) -> Self {
        Self { user, state: Mutex::new(State { next_message: 1, ..State::default() }) }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a room with no messages.
    pub fn add_room(&self, room: RoomId, partner: &str) {
        self.state().rooms.push(RoomSummary {
            room_id: room,
            partner_name: Some(partner.to_string()),
            last_content: None,
            last_created_at: None,
            last_message_created_at: None,
            updated_at: None,
            unread_count: 0,
        });
    }

    /// Append a message to `room`'s history.
    pub fn push_message(&self, room: RoomId, sender: UserId, content: &str) -> ChatMessage {
        let mut state = self.state();
        let id = state.next_message;
        state.next_message += 1;

        let message = ChatMessage {
            message_id: id,
            room_id: Some(room),
            sender_id: Some(sender),
            sender_name: None,
            content: content.to_string(),
            created_at: None,
            attachments: Vec::new(),
        };
        state.history.entry(room).or_default().push(message.clone());
        if let Some(summary) = state.rooms.iter_mut().find(|r| r.room_id == room) {
            summary.last_content = Some(content.to_string());
            if sender != self.user {
                summary.unread_count += 1;
            }
        }
        message
    }

    /// Fill `room` with `count` messages from `sender`.
    pub fn fill(&self, room: RoomId, sender: UserId, count: usize) {
        for i in 0..count {
            self.push_message(room, sender, &format!("message {i}"));
        }
    }

    /// Make room-scoped calls for `room` fail, or succeed again.
    pub fn fail_room(&self, room: RoomId, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(room);
        } else {
            state.failing.remove(&room);
        }
    }

    /// Record how far the other participant has read.
    pub fn set_other_read(&self, room: RoomId, last_read: MessageId) {
        self.state().other_reads.insert(room, last_read);
    }

    /// History page requests so far.
    pub fn page_requests(&self) -> Vec<(RoomId, PageQuery)> {
        self.state().pages.clone()
    }

    /// Last read id reported for `room`.
    pub fn last_read(&self, room: RoomId) -> Option<MessageId> {
        self.state().my_reads.get(&room).copied()
    }

    fn check_room(state: &State, room: RoomId) -> Result<(), ApiError> {
        if state.failing.contains(&room) {
            return Err(ApiError::Status { status: 503, message: "unavailable".into() });
        }
        if !state.rooms.iter().any(|r| r.room_id == room) {
            return Err(ApiError::Status { status: 404, message: "room not found".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for MemoryChatApi {
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        Ok(self.state().rooms.clone())
    }

    async fn get_messages(
        &self,
        room: RoomId,
        query: PageQuery,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut state = self.state();
        state.pages.push((room, query));
        Self::check_room(&state, room)?;

        let history = state.history.get(&room).map(Vec::as_slice).unwrap_or_default();
        let older: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| query.before.is_none_or(|before| m.message_id < before))
            .collect();
        let start = older.len().saturating_sub(query.limit);
        Ok(older[start..].iter().map(|m| (*m).clone()).collect())
    }

    async fn send_message(&self, room: RoomId, content: &str) -> Result<ChatMessage, ApiError> {
        Self::check_room(&self.state(), room)?;
        Ok(self.push_message(room, self.user, content))
    }

    async fn update_read(&self, room: RoomId, last_read: MessageId) -> Result<(), ApiError> {
        let mut state = self.state();
        Self::check_room(&state, room)?;
        state.my_reads.insert(room, last_read);
        if let Some(summary) = state.rooms.iter_mut().find(|r| r.room_id == room) {
            summary.unread_count = 0;
        }
        Ok(())
    }

    async fn get_room_meta(&self, room: RoomId) -> Result<RoomMeta, ApiError> {
        let state = self.state();
        Self::check_room(&state, room)?;
        Ok(RoomMeta {
            room_id: room,
            me_last_read_message_id: state.my_reads.get(&room).copied(),
            other_last_read_message_id: state.other_reads.get(&room).copied(),
        })
    }

    async fn delete_room(&self, room: RoomId) -> Result<(), ApiError> {
        let mut state = self.state();
        Self::check_room(&state, room)?;
        state.rooms.retain(|r| r.room_id != room);
        state.history.remove(&room);
        Ok(())
    }

    async fn upload_attachments(
        &self,
        room: RoomId,
        content: &str,
        files: Vec<FileUpload>,
    ) -> Result<UploadResult, ApiError> {
        Self::check_room(&self.state(), room)?;
        let message = self.push_message(room, self.user, content);
        tracing::debug!(room_id = room, files = files.len(), "attachments stored");
        Ok(UploadResult { ok: true, message_id: Some(message.message_id), attachments: Vec::new() })
    }
}
