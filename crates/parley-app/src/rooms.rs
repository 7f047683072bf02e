//! Room list ordered by recent activity.

use parley_proto::{
    RoomId,
    payloads::chat::{ChatMessage, RoomSummary},
};

/// Preview used when a message carries no text.
const EMPTY_PREVIEW: &str = "…";

/// Rooms, newest activity first.
///
/// Activity is the first present of `lastCreatedAt`, `lastMessageCreatedAt`
/// and `updatedAt`. Timestamps are ISO-8601 strings from one server, so they
/// order correctly as text. Rooms without any timestamp sort last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomList {
    rooms: Vec<RoomSummary>,
}

impl RoomList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a fresh server copy.
    pub fn replace(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
        self.sort();
    }

    /// Rooms in display order.
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    /// Room by id.
    pub fn get(&self, room: RoomId) -> Option<&RoomSummary> {
        self.rooms.iter().find(|r| r.room_id == room)
    }

    /// Most recently active room.
    pub fn first(&self) -> Option<RoomId> {
        self.rooms.first().map(|r| r.room_id)
    }

    /// Number of rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Move `room` to reflect a newly arrived message.
    ///
    /// Updates the preview and activity time. A message without a timestamp
    /// still counts as the newest activity. Unknown rooms are ignored; the
    /// next reload brings them in.
    pub fn bump(&mut self, room: RoomId, message: &ChatMessage) -> bool {
        let Some(index) = self.rooms.iter().position(|r| r.room_id == room) else {
            return false;
        };

        let preview = message.content.trim();
        let entry = &mut self.rooms[index];
        entry.last_content =
            Some(if preview.is_empty() { EMPTY_PREVIEW } else { preview }.to_string());

        match &message.created_at {
            Some(at) => {
                entry.last_created_at = Some(at.clone());
                self.sort();
            },
            None => {
                let entry = self.rooms.remove(index);
                self.rooms.insert(0, entry);
            },
        }
        true
    }

    /// Count one more unread message in `room`.
    pub fn add_unread(&mut self, room: RoomId) {
        if let Some(entry) = self.rooms.iter_mut().find(|r| r.room_id == room) {
            entry.unread_count = entry.unread_count.saturating_add(1);
        }
    }

    /// Zero the unread counter of `room`.
    pub fn mark_read(&mut self, room: RoomId) {
        if let Some(entry) = self.rooms.iter_mut().find(|r| r.room_id == room) {
            entry.unread_count = 0;
        }
    }

    /// Remove `room`, returning it.
    pub fn remove(&mut self, room: RoomId) -> Option<RoomSummary> {
        let index = self.rooms.iter().position(|r| r.room_id == room)?;
        Some(self.rooms.remove(index))
    }

    fn sort(&mut self) {
        // stable: equal activity keeps server order
        self.rooms.sort_by(|a, b| activity(b).cmp(&activity(a)));
    }
}

fn activity(room: &RoomSummary) -> Option<&str> {
    [&room.last_created_at, &room.last_message_created_at, &room.updated_at]
        .into_iter()
        .find_map(|at| at.as_deref().filter(|s| !s.is_empty()))
}
