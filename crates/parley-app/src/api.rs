//! REST collaborator interface.
//!
//! The view only needs these calls to fail with a printable reason; REST
//! failures never affect the broker connection.

use async_trait::async_trait;
use parley_proto::{
    MessageId, RoomId,
    payloads::chat::{ChatMessage, RoomMeta, RoomSummary, UploadResult},
};
use thiserror::Error;

/// Page request for the message history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// Return only messages older than this id (`cursor`)
    pub before: Option<MessageId>,
    /// Maximum number of messages
    pub limit: usize,
}

/// File to upload with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Name shown to other participants
    pub file_name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// REST failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Server answered with a non-success status
    #[error("{message} (HTTP {status})")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server `message` field, or the status reason
        message: String,
    },

    /// Request never produced a response
    #[error("request failed: {0}")]
    Request(String),

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Configuration is unusable
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Request(_) => true,
            Self::Decode(_) | Self::InvalidBaseUrl(_) => false,
        }
    }
}

/// Chat REST API.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Rooms of the current user.
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError>;

    /// One page of a room's history.
    async fn get_messages(&self, room: RoomId, query: PageQuery)
    -> Result<Vec<ChatMessage>, ApiError>;

    /// Post a message through REST instead of the broker.
    async fn send_message(&self, room: RoomId, content: &str) -> Result<ChatMessage, ApiError>;

    /// Record how far the current user has read.
    async fn update_read(&self, room: RoomId, last_read: MessageId) -> Result<(), ApiError>;

    /// Read state of a room.
    async fn get_room_meta(&self, room: RoomId) -> Result<RoomMeta, ApiError>;

    /// Delete a room.
    async fn delete_room(&self, room: RoomId) -> Result<(), ApiError>;

    /// Post a message with attached files.
    async fn upload_attachments(
        &self,
        room: RoomId,
        content: &str,
        files: Vec<FileUpload>,
    ) -> Result<UploadResult, ApiError>;
}
