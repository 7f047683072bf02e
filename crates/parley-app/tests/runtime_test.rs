//! Runtime tests against an in-memory driver and REST collaborator.
//!
//! # Oracle Pattern
//!
//! Tests end with oracle checks that verify:
//! - the topics the driver holds match the active room
//! - REST calls were made with the expected cursors
//! - App state reflects what the user should see

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use parley_app::{
    ApiError, App, AppEvent, Bridge, ChatApi, Driver, FileUpload, NOT_FOUND_NOTICE, PageQuery,
    Runtime, SEND_FAILED, ViewConfig,
};
use parley_client::{RoomId, SubscriptionToken, TopicKey, TransportState};
use parley_core::SubscriptionRegistry;
use parley_proto::{
    MessageId, Payload,
    payloads::chat::{ChatMessage, RoomMeta, RoomSummary, UploadResult},
};
use serde_json::json;

type Queue = Arc<Mutex<VecDeque<AppEvent>>>;

/// Driver that keeps subscriptions in a registry and delivers on demand.
struct MockDriver {
    registry: SubscriptionRegistry,
    events: Queue,
    connected: bool,
    sent: Vec<(RoomId, String)>,
    scrolled: Vec<MessageId>,
    renders: usize,
}

impl MockDriver {
    fn new() -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            events: Arc::default(),
            connected: false,
            sent: Vec::new(),
            scrolled: Vec::new(),
            renders: 0,
        }
    }

    fn topics(&self) -> Vec<TopicKey> {
        self.registry.desired_topics().collect()
    }

    fn deliver(&mut self, topic: TopicKey, payload: &Payload) {
        self.registry.dispatch(topic, payload);
    }

    fn take_events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl Driver for MockDriver {
    type Error = io::Error;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        Ok(self.events.lock().unwrap().pop_front())
    }

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connected = true;
        self.events
            .lock()
            .unwrap()
            .push_back(AppEvent::ConnectionChanged(TransportState::Connected));
        Ok(())
    }

    async fn subscribe(&mut self, topic: TopicKey) -> Result<SubscriptionToken, Self::Error> {
        let events = Arc::clone(&self.events);
        let handler = Bridge::handler(topic, move |e| events.lock().unwrap().push_back(e));
        Ok(self.registry.add(topic, handler))
    }

    async fn unsubscribe(&mut self, token: SubscriptionToken) -> Result<bool, Self::Error> {
        Ok(self.registry.remove(token))
    }

    async fn send_room_message(&mut self, room: RoomId, content: &str) -> Result<bool, Self::Error> {
        if self.connected {
            self.sent.push((room, content.to_string()));
        }
        Ok(self.connected)
    }

    fn scroll_to(&mut self, message_id: MessageId) {
        self.scrolled.push(message_id);
    }

    fn render(&mut self, _app: &App) -> Result<(), Self::Error> {
        self.renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.connected = false;
    }
}

/// REST collaborator serving a fixed history per room.
#[derive(Default)]
struct HistoryApi {
    rooms: Vec<RoomSummary>,
    /// Messages 1..=len for every room
    history_len: u64,
    pages: Mutex<Vec<(RoomId, PageQuery)>>,
    reads: Mutex<Vec<(RoomId, MessageId)>>,
}

impl HistoryApi {
    fn new(rooms: &[RoomId], history_len: u64) -> Self {
        let rooms = rooms
            .iter()
            .enumerate()
            .map(|(i, &room_id)| RoomSummary {
                room_id,
                partner_name: Some(format!("partner {room_id}")),
                last_content: None,
                last_created_at: Some(format!("2024-01-{:02}T00:00:00", 28 - i)),
                last_message_created_at: None,
                updated_at: None,
                unread_count: 1,
            })
            .collect();
        Self { rooms, history_len, ..Self::default() }
    }

    fn older_requests(&self) -> usize {
        self.pages.lock().unwrap().iter().filter(|(_, q)| q.before.is_some()).count()
    }
}

fn message(room: RoomId, id: MessageId) -> ChatMessage {
    ChatMessage {
        message_id: id,
        room_id: Some(room),
        sender_id: Some(7),
        sender_name: Some("ana".into()),
        content: format!("message {id}"),
        created_at: None,
        attachments: Vec::new(),
    }
}

#[async_trait]
impl ChatApi for HistoryApi {
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        Ok(self.rooms.clone())
    }

    async fn get_messages(
        &self,
        room: RoomId,
        query: PageQuery,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.pages.lock().unwrap().push((room, query));
        let end = query.before.map_or(self.history_len, |before| before.saturating_sub(1));
        let start = end.saturating_sub(query.limit as u64 - 1).max(1);
        Ok((start..=end).map(|id| message(room, id)).collect())
    }

    async fn send_message(&self, room: RoomId, content: &str) -> Result<ChatMessage, ApiError> {
        let mut sent = message(room, self.history_len + 1);
        sent.content = content.to_string();
        Ok(sent)
    }

    async fn update_read(&self, room: RoomId, last_read: MessageId) -> Result<(), ApiError> {
        self.reads.lock().unwrap().push((room, last_read));
        Ok(())
    }

    async fn get_room_meta(&self, room: RoomId) -> Result<RoomMeta, ApiError> {
        Ok(RoomMeta {
            room_id: room,
            me_last_read_message_id: None,
            other_last_read_message_id: Some(self.history_len.saturating_sub(2)),
        })
    }

    async fn delete_room(&self, _room: RoomId) -> Result<(), ApiError> {
        Err(ApiError::Status { status: 403, message: "not a member".into() })
    }

    async fn upload_attachments(
        &self,
        _room: RoomId,
        _content: &str,
        _files: Vec<FileUpload>,
    ) -> Result<UploadResult, ApiError> {
        Ok(UploadResult { ok: true, message_id: None, attachments: Vec::new() })
    }
}

async fn started(rooms: &[RoomId], history_len: u64) -> Runtime<MockDriver, HistoryApi> {
    let mut runtime = Runtime::new(
        MockDriver::new(),
        HistoryApi::new(rooms, history_len),
        App::new(ViewConfig::default()),
    );
    assert!(!runtime.start().await.unwrap());
    pump(&mut runtime).await;
    runtime
}

/// Dispatch queued driver events until none are left.
async fn pump(runtime: &mut Runtime<MockDriver, HistoryApi>) {
    loop {
        let events = runtime.driver().take_events();
        if events.is_empty() {
            break;
        }
        for event in events {
            runtime.dispatch(event).await.unwrap();
        }
    }
}

#[tokio::test]
async fn startup_enters_newest_room_and_subscribes() {
    let runtime = started(&[4, 9], 100).await;

    let app = runtime.app();
    assert_eq!(app.connection(), TransportState::Connected);
    assert_eq!(app.active_room(), Some(4));
    assert_eq!(app.view().messages().len(), 30);
    assert_eq!(app.view().latest_id(), Some(100));
    assert!(app.view().is_read_by_other(98));
    assert_eq!(runtime.driver().topics(), vec![
        TopicKey::RoomsIndex,
        TopicKey::Room(4),
        TopicKey::RoomRead(4)
    ]);
    assert_eq!(*runtime.api().reads.lock().unwrap(), vec![(4, 100)]);
    assert!(runtime.driver().renders > 0);
}

#[tokio::test]
async fn switching_rooms_moves_subscriptions() {
    let mut runtime = started(&[4, 9], 100).await;
    runtime.dispatch(AppEvent::SelectRoom(9)).await.unwrap();

    assert_eq!(runtime.app().active_room(), Some(9));
    assert_eq!(runtime.driver().topics(), vec![
        TopicKey::RoomsIndex,
        TopicKey::Room(9),
        TopicKey::RoomRead(9)
    ]);
}

#[tokio::test]
async fn live_message_is_merged_once() {
    let mut runtime = started(&[4], 100).await;
    let payload = Payload::from(json!({"id": 101, "roomId": 4, "senderId": 7, "content": "new"}));

    runtime.driver_mut().deliver(TopicKey::Room(4), &payload);
    runtime.driver_mut().deliver(TopicKey::Room(4), &payload);
    pump(&mut runtime).await;

    let view = runtime.app().view();
    assert_eq!(view.messages().len(), 31);
    assert_eq!(view.latest_id(), Some(101));
    assert_eq!(runtime.api().reads.lock().unwrap().last(), Some(&(4, 101)));
}

#[tokio::test]
async fn rooms_queue_change_reloads_room_list() {
    let mut runtime = started(&[4], 100).await;
    let before = runtime.driver().renders;

    runtime.driver_mut().deliver(TopicKey::RoomsIndex, &Payload::from(json!({"type": "TYPING"})));
    pump(&mut runtime).await;
    assert_eq!(runtime.driver().renders, before);

    runtime
        .driver_mut()
        .deliver(TopicKey::RoomsIndex, &Payload::from(json!({"type": "ROOMS_CHANGED"})));
    pump(&mut runtime).await;
    assert!(runtime.driver().renders > before);
}

#[tokio::test]
async fn jump_gives_up_after_eight_older_pages() {
    let mut runtime = started(&[4], 1000).await;
    runtime.dispatch(AppEvent::JumpTo { message_id: 5 }).await.unwrap();

    assert_eq!(runtime.api().older_requests(), 8);
    assert_eq!(runtime.app().view().notice(), Some(NOT_FOUND_NOTICE));
    assert_eq!(runtime.app().view().messages().len(), 30 * 9);
    assert!(runtime.driver().scrolled.is_empty());
}

#[tokio::test]
async fn jump_scrolls_to_found_message() {
    let mut runtime = started(&[4], 1000).await;
    runtime.dispatch(AppEvent::JumpTo { message_id: 900 }).await.unwrap();

    assert_eq!(runtime.api().older_requests(), 3);
    assert_eq!(runtime.driver().scrolled, vec![900]);
    assert_eq!(runtime.app().view().notice(), None);
}

#[tokio::test]
async fn send_requires_connection() {
    let mut runtime = started(&[4], 10).await;
    runtime.driver_mut().stop();
    runtime.dispatch(AppEvent::SendRequested { content: "hi".into() }).await.unwrap();
    assert_eq!(runtime.app().status_message(), Some(SEND_FAILED));
    assert!(runtime.driver().sent.is_empty());

    runtime.driver_mut().connected = true;
    runtime.dispatch(AppEvent::SendRequested { content: "hi".into() }).await.unwrap();
    assert_eq!(runtime.driver().sent, vec![(4, "hi".to_string())]);
    assert_eq!(runtime.app().status_message(), None);
}

#[tokio::test]
async fn failed_delete_keeps_room() {
    let mut runtime = started(&[4], 10).await;
    runtime.dispatch(AppEvent::DeleteRequested { room: 4 }).await.unwrap();

    assert_eq!(runtime.app().rooms().len(), 1);
    assert_eq!(runtime.app().status_message(), Some("delete failed: not a member (HTTP 403)"));
}

#[tokio::test]
async fn quit_releases_every_subscription() {
    let mut runtime = started(&[4], 10).await;
    assert!(runtime.dispatch(AppEvent::Quit).await.unwrap());
    assert!(runtime.driver().topics().is_empty());
}
