//! Property-based tests for the App state machine.
//!
//! Tests verify that view invariants hold under arbitrary interleavings of
//! room switches, page results (including stale ones), live deliveries and
//! jump requests.

use parley_app::{App, AppAction, AppEvent, PageKind, ViewConfig, ViewStatus};
use parley_proto::{
    MessageId, RoomId,
    payloads::chat::{ChatMessage, ReadReceipt},
};
use proptest::prelude::*;

fn message(room: RoomId, id: MessageId) -> ChatMessage {
    ChatMessage {
        message_id: id,
        room_id: Some(room),
        sender_id: Some(2),
        sender_name: None,
        content: format!("m{id}"),
        created_at: None,
        attachments: Vec::new(),
    }
}

fn page_strategy() -> impl Strategy<Value = Result<Vec<MessageId>, String>> {
    prop_oneof![
        4 => prop::collection::vec(1u64..200, 0..40).prop_map(Ok),
        1 => Just(Err("unavailable".to_string())),
    ]
}

/// Generate random app events over a small set of rooms.
fn event_strategy() -> impl Strategy<Value = AppEvent> {
    let room = 1u64..4;
    prop_oneof![
        1 => Just(AppEvent::Tick),
        2 => room.clone().prop_map(AppEvent::SelectRoom),
        3 => (room.clone(), any::<bool>(), page_strategy()).prop_map(|(room, latest, result)| {
            AppEvent::PageLoaded {
                room,
                kind: if latest { PageKind::Latest } else { PageKind::Older },
                result: result.map(|ids| ids.into_iter().map(|id| message(room, id)).collect()),
            }
        }),
        4 => (room.clone(), 1u64..250)
            .prop_map(|(room, id)| AppEvent::LiveMessage { room, message: message(room, id) }),
        1 => (room.clone(), 1u64..250, 1u64..3).prop_map(|(room, last, user)| AppEvent::ReadReceipt {
            room,
            receipt: ReadReceipt { room_id: Some(room), user_id: Some(user), last_read_message_id: last },
        }),
        1 => (1u64..250).prop_map(|message_id| AppEvent::JumpTo { message_id }),
        1 => (room, any::<bool>()).prop_map(|(room, sent)| AppEvent::MessageSent { room, sent }),
    ]
}

proptest! {
    #[test]
    fn view_messages_stay_sorted_and_unique(events in prop::collection::vec(event_strategy(), 0..80)) {
        let mut app = App::new(ViewConfig::default());
        app.set_local_user(Some(1));

        for event in events {
            let actions = app.handle(event);
            let view = app.view();

            let ids: Vec<MessageId> = view.messages().iter().map(|m| m.message_id).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "unsorted or duplicate: {ids:?}");

            if view.room().is_none() {
                prop_assert!(ids.is_empty());
                prop_assert_eq!(view.status(), &ViewStatus::Idle);
            }

            for action in &actions {
                if let AppAction::FetchPage { room, .. }
                | AppAction::LoadMeta { room }
                | AppAction::SubscribeRoom { room }
                | AppAction::UpdateRead { room, .. } = action
                {
                    prop_assert_eq!(Some(*room), view.room());
                }
                if let AppAction::FetchPage { kind: PageKind::Older, before, .. } = action {
                    prop_assert_eq!(*before, ids.first().copied());
                }
            }
        }
    }

    #[test]
    fn other_read_marker_is_monotonic(receipts in prop::collection::vec((1u64..100, 1u64..3), 0..40)) {
        let mut app = App::new(ViewConfig::default());
        app.set_local_user(Some(1));
        app.handle(AppEvent::SelectRoom(1));

        let mut last = None;
        for (id, user) in receipts {
            app.handle(AppEvent::ReadReceipt {
                room: 1,
                receipt: ReadReceipt { room_id: Some(1), user_id: Some(user), last_read_message_id: id },
            });
            let current = app.view().other_last_read();
            prop_assert!(current >= last);
            last = current;
        }
    }
}
