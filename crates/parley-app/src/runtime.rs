//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`ChatApi`]: REST collaborator
//! - [`Driver`]: live connection and frontend I/O
//!
//! Action results are fed back into the App as events until no work is left,
//! so one input event runs to completion before the next is polled.

use std::collections::VecDeque;

use parley_client::TopicKey;

use crate::{
    App, AppAction, AppEvent, ChatApi, Driver,
    api::{ApiError, PageQuery},
};

/// Appended to REST failures that may succeed later.
pub const RETRY_HINT: &str = "try again later";

/// Generic runtime that orchestrates App, REST and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `A`: REST implementation
pub struct Runtime<D, A>
where
    D: Driver,
    A: ChatApi,
{
    driver: D,
    api: A,
    app: App,
}

impl<D, A> Runtime<D, A>
where
    D: Driver,
    A: ChatApi,
{
    /// Create a new runtime.
    pub fn new(driver: D, api: A, app: App) -> Self {
        Self { driver, api, app }
    }

    /// Run the main event loop until the user quits.
    ///
    /// Drivers are expected to wait inside
    /// [`poll_event`](Driver::poll_event) rather than return `None` in a
    /// tight loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error. REST failures
    /// are reported through the App, never here.
    pub async fn run(mut self) -> Result<(), D::Error> {
        if !self.start().await? {
            loop {
                let Some(event) = self.driver.poll_event().await? else {
                    continue;
                };
                if self.dispatch(event).await? {
                    break;
                }
            }
        }

        self.driver.stop();
        Ok(())
    }

    /// Render and run the startup actions.
    ///
    /// Returns `true` if the application should quit.
    pub async fn start(&mut self) -> Result<bool, D::Error> {
        self.driver.render(&self.app)?;
        let actions = self.app.start();
        self.process_actions(actions).await
    }

    /// Feed one event through the App and run everything it causes.
    ///
    /// Returns `true` if the application should quit.
    pub async fn dispatch(&mut self, event: AppEvent) -> Result<bool, D::Error> {
        let actions = self.app.handle(event);
        self.process_actions(actions).await
    }

    async fn process_actions(&mut self, actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending: VecDeque<AppAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            if action == AppAction::Quit {
                return Ok(true);
            }
            if let Some(event) = self.execute(action).await? {
                pending.extend(self.app.handle(event));
            }
        }
        Ok(false)
    }

    /// Run one action, returning the event that reports its result.
    async fn execute(&mut self, action: AppAction) -> Result<Option<AppEvent>, D::Error> {
        let event = match action {
            AppAction::Render => {
                self.driver.render(&self.app)?;
                None
            },
            AppAction::Quit => None,
            AppAction::Connect => {
                if let Err(e) = self.driver.connect().await {
                    tracing::warn!(error = %e, "connect failed");
                    self.app.set_status(format!("connect failed: {e}"));
                    self.driver.render(&self.app)?;
                }
                None
            },
            AppAction::LoadRooms => {
                let result = self.api.get_rooms().await.map_err(failure_text);
                Some(AppEvent::RoomsLoaded(result))
            },
            AppAction::SubscribeRooms => {
                let token = self.driver.subscribe(TopicKey::RoomsIndex).await?;
                Some(AppEvent::RoomsSubscribed(token))
            },
            AppAction::FetchPage { room, kind, before, limit } => {
                let result = self
                    .api
                    .get_messages(room, PageQuery { before, limit })
                    .await
                    .map_err(failure_text);
                Some(AppEvent::PageLoaded { room, kind, result })
            },
            AppAction::LoadMeta { room } => {
                let result = self.api.get_room_meta(room).await.map_err(failure_text);
                Some(AppEvent::MetaLoaded { room, result })
            },
            AppAction::SubscribeRoom { room } => {
                let messages = self.driver.subscribe(TopicKey::Room(room)).await?;
                let receipts = self.driver.subscribe(TopicKey::RoomRead(room)).await?;
                Some(AppEvent::RoomSubscribed { room, tokens: vec![messages, receipts] })
            },
            AppAction::Unsubscribe { tokens } => {
                for token in tokens {
                    if !self.driver.unsubscribe(token).await? {
                        tracing::debug!(?token, "token already released");
                    }
                }
                None
            },
            AppAction::UpdateRead { room, last_read } => {
                if let Err(e) = self.api.update_read(room, last_read).await {
                    let transient = e.is_transient();
                    tracing::debug!(room_id = room, last_read, transient, error = %e, "read update failed");
                }
                None
            },
            AppAction::SendMessage { room, content } => {
                let sent = self.driver.send_room_message(room, &content).await?;
                Some(AppEvent::MessageSent { room, sent })
            },
            AppAction::DeleteRoom { room } => {
                let result = self.api.delete_room(room).await.map_err(failure_text);
                Some(AppEvent::RoomDeleted { room, result })
            },
            AppAction::ScrollTo { message_id } => {
                self.driver.scroll_to(message_id);
                None
            },
        };
        Ok(event)
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Get a reference to the REST client
    pub fn api(&self) -> &A {
        &self.api
    }
}

/// User-facing text for a failed REST call.
fn failure_text(error: ApiError) -> String {
    if error.is_transient() {
        tracing::debug!(error = %error, "transient REST failure");
        format!("{error}; {RETRY_HINT}")
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_suggest_retry() {
        let busy = ApiError::Status { status: 503, message: "unavailable".into() };
        assert_eq!(failure_text(busy), "unavailable (HTTP 503); try again later");

        let forbidden = ApiError::Status { status: 403, message: "not a member".into() };
        assert_eq!(failure_text(forbidden), "not a member (HTTP 403)");
    }
}
