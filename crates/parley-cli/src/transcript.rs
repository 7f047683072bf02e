//! Text rendering of App state.
//!
//! A line-oriented terminal cannot redraw, so [`Transcript`] remembers what
//! it already printed and emits only what changed since the last render.

use parley_app::App;
use parley_client::{MessageId, RoomId, TransportState};
use parley_proto::payloads::chat::ChatMessage;

/// Incremental printer for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    connection: Option<TransportState>,
    /// `(room, unread)` as last printed
    rooms: Vec<(RoomId, u64)>,
    room: Option<RoomId>,
    /// Newest message printed for `room`
    last_printed: Option<MessageId>,
    other_read: Option<MessageId>,
    /// Status, notice and error texts currently shown
    alerts: Vec<String>,
    scroll: Option<MessageId>,
}

impl Transcript {
    /// Empty transcript; the first update prints everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highlight `message_id` on the next update.
    pub fn scroll_to(&mut self, message_id: MessageId) {
        self.scroll = Some(message_id);
    }

    /// Lines describing what changed in `app` since the previous call.
    pub fn update(&mut self, app: &App) -> Vec<String> {
        let mut lines = Vec::new();

        let connection = app.connection();
        if self.connection != Some(connection) {
            self.connection = Some(connection);
            lines.push(format!("-- {}", state_label(connection)));
        }

        let rooms: Vec<(RoomId, u64)> =
            app.rooms().rooms().iter().map(|r| (r.room_id, r.unread_count)).collect();
        if rooms != self.rooms {
            lines.push(rooms_line(app));
            self.rooms = rooms;
        }

        let view = app.view();
        if view.room() != self.room {
            self.room = view.room();
            self.last_printed = None;
            self.other_read = None;
            lines.push(match self.room {
                Some(room) => {
                    let partner = app.rooms().get(room).and_then(|r| r.partner_name.as_deref());
                    format!("== room {room} ({}) ==", partner.unwrap_or("unknown"))
                },
                None => "== no room ==".to_string(),
            });
        }

        for message in view.messages() {
            if self.last_printed.is_none_or(|last| message.message_id > last) {
                lines.push(message_line(message));
                self.last_printed = Some(message.message_id);
            }
        }

        let other_read = view.other_last_read();
        if other_read != self.other_read {
            self.other_read = other_read;
            if let Some(id) = other_read {
                lines.push(format!("-- read up to {id}"));
            }
        }

        if let Some(target) = self.scroll.take()
            && let Some(message) = view.messages().iter().find(|m| m.message_id == target)
        {
            lines.push(format!("-> {}", message_line(message)));
        }

        let alerts: Vec<String> =
            [app.status_message(), app.rooms_error(), view.notice(), view.error()]
                .into_iter()
                .flatten()
                .map(ToString::to_string)
                .collect();
        for alert in &alerts {
            if !self.alerts.contains(alert) {
                lines.push(format!("!! {alert}"));
            }
        }
        self.alerts = alerts;

        lines
    }
}

fn state_label(state: TransportState) -> &'static str {
    match state {
        TransportState::Disconnected => "disconnected",
        TransportState::Connecting => "connecting",
        TransportState::Connected => "connected",
    }
}

fn rooms_line(app: &App) -> String {
    if app.rooms().is_empty() {
        return "rooms: none".to_string();
    }
    let entries: Vec<String> = app
        .rooms()
        .rooms()
        .iter()
        .map(|r| {
            let marker = if app.active_room() == Some(r.room_id) { "*" } else { "" };
            let name = r.partner_name.as_deref().unwrap_or("?");
            if r.unread_count > 0 {
                format!("{marker}{} {name} ({} unread)", r.room_id, r.unread_count)
            } else {
                format!("{marker}{} {name}", r.room_id)
            }
        })
        .collect();
    format!("rooms: {}", entries.join(", "))
}

fn message_line(message: &ChatMessage) -> String {
    let sender = match (&message.sender_name, message.sender_id) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("user {id}"),
        (None, None) => "?".to_string(),
    };
    let mut line = format!("[{}] {sender}: {}", message.message_id, message.content);
    if !message.attachments.is_empty() {
        line.push_str(&format!(" (+{} files)", message.attachments.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use parley_app::{AppEvent, PageKind, ViewConfig};
    use parley_proto::payloads::chat::RoomSummary;

    use super::*;

    fn summary(room_id: RoomId, unread_count: u64) -> RoomSummary {
        RoomSummary {
            room_id,
            partner_name: Some(format!("p{room_id}")),
            last_content: None,
            last_created_at: None,
            last_message_created_at: None,
            updated_at: None,
            unread_count,
        }
    }

    fn message(id: MessageId) -> ChatMessage {
        ChatMessage {
            message_id: id,
            room_id: Some(3),
            sender_id: Some(9),
            sender_name: None,
            content: format!("text {id}"),
            created_at: None,
            attachments: Vec::new(),
        }
    }

    fn app_in_room() -> App {
        let mut app = App::new(ViewConfig::default());
        app.handle(AppEvent::RoomsLoaded(Ok(vec![summary(3, 0)])));
        app.handle(AppEvent::PageLoaded {
            room: 3,
            kind: PageKind::Latest,
            result: Ok(vec![message(1), message(2)]),
        });
        app
    }

    #[test]
    fn first_update_prints_everything() {
        let app = app_in_room();
        let lines = Transcript::new().update(&app);

        assert_eq!(lines, vec![
            "-- disconnected".to_string(),
            "rooms: *3 p3".to_string(),
            "== room 3 (p3) ==".to_string(),
            "[1] user 9: text 1".to_string(),
            "[2] user 9: text 2".to_string(),
        ]);
    }

    #[test]
    fn later_updates_print_only_new_messages() {
        let mut app = app_in_room();
        let mut transcript = Transcript::new();
        transcript.update(&app);
        assert!(transcript.update(&app).is_empty());

        app.handle(AppEvent::LiveMessage { room: 3, message: message(3) });
        let lines = transcript.update(&app);
        assert!(lines.contains(&"[3] user 9: text 3".to_string()));
        assert!(!lines.iter().any(|l| l.contains("text 2")));
    }

    #[test]
    fn alerts_print_once() {
        let mut app = app_in_room();
        let mut transcript = Transcript::new();
        transcript.update(&app);

        app.set_status("delete failed");
        assert_eq!(transcript.update(&app), vec!["!! delete failed".to_string()]);
        assert!(transcript.update(&app).is_empty());
    }

    #[test]
    fn scroll_highlights_loaded_message() {
        let app = app_in_room();
        let mut transcript = Transcript::new();
        transcript.update(&app);

        transcript.scroll_to(1);
        assert_eq!(transcript.update(&app), vec!["-> [1] user 9: text 1".to_string()]);
        transcript.scroll_to(99);
        assert!(transcript.update(&app).is_empty());
    }
}
