//! HTTP implementation of [`ChatApi`] over reqwest.

use async_trait::async_trait;
use parley_proto::{
    MessageId, RoomId,
    payloads::chat::{ChatMessage, RoomMeta, RoomSummary, UploadResult},
};
use reqwest::{
    Client, RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::api::{ApiError, ChatApi, FileUpload, PageQuery};

/// REST prefix under the server origin.
pub const API_PREFIX: &str = "/api";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadBody {
    last_read_message_id: MessageId,
}

/// Chat REST client authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    /// `{origin}/api`, no trailing slash
    base: String,
    token: String,
}

impl HttpChatApi {
    /// Client for the server at `base_url` (its origin, e.g.
    /// `http://localhost:8080`).
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let origin = Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl(format!("unsupported scheme {}", origin.scheme())));
        }
        let client = Client::builder().build().map_err(|e| ApiError::Request(e.to_string()))?;
        let base = format!("{}{API_PREFIX}", origin.as_str().trim_end_matches('/'));
        Ok(Self { client, base, token: token.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.token)
    }

    async fn execute(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Request(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        tracing::debug!(status = status.as_u16(), %message, "request rejected");
        Err(ApiError::Status { status: status.as_u16(), message })
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        Self::execute(request).await?.json().await.map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        Self::json(self.get("/chat/rooms")).await
    }

    async fn get_messages(
        &self,
        room: RoomId,
        query: PageQuery,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut request =
            self.get(&format!("/chat/rooms/{room}/messages")).query(&[("limit", query.limit)]);
        if let Some(cursor) = query.before {
            request = request.query(&[("cursor", cursor)]);
        }
        Self::json(request).await
    }

    async fn send_message(&self, room: RoomId, content: &str) -> Result<ChatMessage, ApiError> {
        let request = self.post(&format!("/chat/rooms/{room}/messages")).json(&ContentBody { content });
        Self::json(request).await
    }

    async fn update_read(&self, room: RoomId, last_read: MessageId) -> Result<(), ApiError> {
        let request = self
            .post(&format!("/chat/rooms/{room}/read"))
            .json(&ReadBody { last_read_message_id: last_read });
        Self::execute(request).await.map(drop)
    }

    async fn get_room_meta(&self, room: RoomId) -> Result<RoomMeta, ApiError> {
        Self::json(self.get(&format!("/chat/rooms/{room}/meta"))).await
    }

    async fn delete_room(&self, room: RoomId) -> Result<(), ApiError> {
        let request =
            self.client.delete(self.url(&format!("/chat/rooms/{room}"))).bearer_auth(&self.token);
        Self::execute(request).await.map(drop)
    }

    async fn upload_attachments(
        &self,
        room: RoomId,
        content: &str,
        files: Vec<FileUpload>,
    ) -> Result<UploadResult, ApiError> {
        let mut form = Form::new().text("content", content.to_string());
        for file in files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(content_type) = file.content_type {
                part = part.mime_str(&content_type).map_err(|e| ApiError::Request(e.to_string()))?;
            }
            form = form.part("files", part);
        }
        Self::json(self.post(&format!("/chat/rooms/{room}/attachments")).multipart(form)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_is_under_origin() {
        let api = HttpChatApi::new("http://localhost:8080/", "t").unwrap();
        assert_eq!(api.url("/chat/rooms"), "http://localhost:8080/api/chat/rooms");
    }

    #[test]
    fn rejects_non_http_origin() {
        assert!(matches!(
            HttpChatApi::new("ws://localhost:8080", "t"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }
}
