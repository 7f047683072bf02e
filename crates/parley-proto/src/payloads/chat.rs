//! Chat payloads.
//!
//! JSON shapes exchanged with the chat server, over both the broker and the
//! REST API. Field names are camelCase on the wire. Identifiers are decoded
//! leniently: the server sometimes sends them as strings, so both `7` and
//! `"7"` decode to the same [`RoomId`]/[`MessageId`].

use serde::{Deserialize, Serialize};

use crate::{
    destination::{MessageId, RoomId, UserId},
    errors::{ProtocolError, Result},
};

/// Event type announcing that the room list must be reloaded.
pub const ROOMS_CHANGED: &str = "ROOMS_CHANGED";

/// Message published to `/app/chat/send`.
///
/// Serializes to exactly `{"roomId": <int>, "content": "<str>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundChatMessage {
    /// Target room
    pub room_id: RoomId,
    /// Trimmed, non-empty text
    pub content: String,
}

impl OutboundChatMessage {
    /// Build a message from user input. `None` if nothing remains after
    /// trimming.
    pub fn new(room_id: RoomId, content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        Some(Self { room_id, content: content.to_string() })
    }

    /// JSON body.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }
}

/// Chat message as delivered by the broker or listed by the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned id (`id` on some endpoints)
    #[serde(alias = "id", deserialize_with = "lenient_id::required")]
    pub message_id: MessageId,
    /// Room the message belongs to
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub room_id: Option<RoomId>,
    /// Author
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub sender_id: Option<UserId>,
    /// Author display name, when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// ISO-8601 creation time
    #[serde(default)]
    pub created_at: Option<String>,
    /// Uploaded files attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Server-assigned id
    #[serde(alias = "id", deserialize_with = "lenient_id::required")]
    pub attachment_id: u64,
    /// Original file name
    #[serde(default, alias = "originalName")]
    pub file_name: Option<String>,
    /// MIME type
    #[serde(default)]
    pub content_type: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// Result of an attachment upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Whether the server accepted the upload
    #[serde(default)]
    pub ok: bool,
    /// Message created for the upload
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub message_id: Option<MessageId>,
    /// Stored files
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Read receipt published on a room's read topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Room that was read
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub room_id: Option<RoomId>,
    /// Reader
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub user_id: Option<UserId>,
    /// Newest message the reader has seen
    #[serde(deserialize_with = "lenient_id::required")]
    pub last_read_message_id: MessageId,
}

/// Event on the per-user rooms queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsEvent {
    /// Event type, e.g. [`ROOMS_CHANGED`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Room concerned, if any
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub room_id: Option<RoomId>,
}

impl RoomsEvent {
    /// Whether the event asks for a room list reload.
    pub fn is_rooms_changed(&self) -> bool {
        self.kind == ROOMS_CHANGED
    }
}

/// Entry of the room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Room id (`id` on some endpoints)
    #[serde(alias = "id", deserialize_with = "lenient_id::required")]
    pub room_id: RoomId,
    /// Display name of the other participant (DMs) or the room
    #[serde(default)]
    pub partner_name: Option<String>,
    /// Preview of the newest message
    #[serde(default)]
    pub last_content: Option<String>,
    /// Time of the newest message seen live
    #[serde(default)]
    pub last_created_at: Option<String>,
    /// Time of the newest message according to the server
    #[serde(default)]
    pub last_message_created_at: Option<String>,
    /// Last room update
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Messages not yet read by the current user
    #[serde(default)]
    pub unread_count: u64,
}

/// Read state of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    /// Room id
    #[serde(deserialize_with = "lenient_id::required")]
    pub room_id: RoomId,
    /// Newest message read by the current user
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub me_last_read_message_id: Option<MessageId>,
    /// Newest message read by the other participant
    #[serde(default, deserialize_with = "lenient_id::optional")]
    pub other_last_read_message_id: Option<MessageId>,
}

/// Identifiers that arrive as numbers or numeric strings.
mod lenient_id {
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    fn convert<E: Error>(raw: Raw) -> Result<u64, E> {
        match raw {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid identifier: {s:?}"))),
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        convert(Raw::deserialize(deserializer)?)
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Option::<Raw>::deserialize(deserializer)?.map(convert).transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Payload;

    #[test]
    fn outbound_message_wire_shape() {
        let msg = OutboundChatMessage::new(7, "  hello  ").unwrap();
        assert_eq!(msg.to_json().unwrap(), r#"{"roomId":7,"content":"hello"}"#);
    }

    #[test]
    fn whitespace_only_content_is_rejected() {
        assert!(OutboundChatMessage::new(7, " \n\t ").is_none());
        assert!(OutboundChatMessage::new(7, "").is_none());
    }

    #[test]
    fn message_accepts_id_alias_and_string_ids() {
        let payload = Payload::from(json!({
            "id": "12",
            "roomId": 3,
            "senderId": "5",
            "content": "hi",
            "createdAt": "2024-01-01T00:00:00"
        }));
        let msg: ChatMessage = payload.deserialize().unwrap();
        assert_eq!(msg.message_id, 12);
        assert_eq!(msg.room_id, Some(3));
        assert_eq!(msg.sender_id, Some(5));
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn message_without_id_is_rejected() {
        let payload = Payload::from(json!({"content": "hi"}));
        assert!(payload.deserialize::<ChatMessage>().is_err());
    }

    #[test]
    fn rooms_changed_event() {
        let payload = Payload::from(json!({"type": "ROOMS_CHANGED"}));
        let event: RoomsEvent = payload.deserialize().unwrap();
        assert!(event.is_rooms_changed());
        assert_eq!(event.room_id, None);
    }

    #[test]
    fn room_meta_with_null_reads() {
        let payload = Payload::from(json!({
            "roomId": 1,
            "meLastReadMessageId": 10,
            "otherLastReadMessageId": null
        }));
        let meta: RoomMeta = payload.deserialize().unwrap();
        assert_eq!(meta.me_last_read_message_id, Some(10));
        assert_eq!(meta.other_last_read_message_id, None);
    }
}
