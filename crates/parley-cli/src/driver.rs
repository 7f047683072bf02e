//! Terminal driver.
//!
//! Bridges the [`parley_app::Runtime`] to a spawned chat client task, line
//! input on stdin and transcript output on stdout.

use std::io::{self, Write};

use parley_app::{App, AppEvent, Bridge, Driver, parse_line};
use parley_client::{
    ClientError, MessageId, RoomId, SubscriptionToken, TopicKey, TransportState,
    transport::{ChatHandle, Notice},
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::{broadcast, mpsc, watch},
    time::{Duration, Interval, MissedTickBehavior},
};

use crate::Transcript;

/// How often the App gets a tick.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The chat client rejected a request.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// The chat client task is gone.
    #[error("chat client stopped")]
    ClientStopped,
}

/// Driver over stdin, stdout and a [`ChatHandle`].
pub struct CliDriver {
    handle: ChatHandle,
    credential: String,
    status: watch::Receiver<TransportState>,
    notices: broadcast::Receiver<Notice>,
    /// Bridge handlers push here
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events: mpsc::UnboundedReceiver<AppEvent>,
    input: Lines<BufReader<Stdin>>,
    /// Set once stdin reaches EOF
    input_closed: bool,
    tick: Interval,
    transcript: Transcript,
}

impl CliDriver {
    /// Driver connecting `handle` with `credential`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(handle: ChatHandle, credential: impl Into<String>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            status: handle.watch_state(),
            notices: handle.notices(),
            handle,
            credential: credential.into(),
            events_tx,
            events,
            input: BufReader::new(tokio::io::stdin()).lines(),
            input_closed: false,
            tick,
            transcript: Transcript::new(),
        }
    }

    fn print(lines: &[String]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    fn on_line(line: &str) -> Result<Option<AppEvent>, CliError> {
        match parse_line(line) {
            Ok(event) => Ok(event),
            Err(e) => {
                Self::print(&[format!("!! {e}")])?;
                Ok(None)
            },
        }
    }

    fn on_notice(notice: Result<Notice, broadcast::error::RecvError>) -> Result<(), CliError> {
        match notice {
            Ok(Notice::BrokerError(message)) => Self::print(&[format!("!! broker: {message}")])?,
            Ok(Notice::Liveness(_)) => tracing::trace!("liveness reply"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "notices lagged");
            },
            Err(broadcast::error::RecvError::Closed) => return Err(CliError::ClientStopped),
        }
        Ok(())
    }
}

impl Driver for CliDriver {
    type Error = CliError;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        tokio::select! {
            Some(event) = self.events.recv() => Ok(Some(event)),
            changed = self.status.changed() => {
                changed.map_err(|_| CliError::ClientStopped)?;
                let state = *self.status.borrow_and_update();
                Ok(Some(AppEvent::ConnectionChanged(state)))
            },
            notice = self.notices.recv() => {
                Self::on_notice(notice)?;
                Ok(None)
            },
            line = self.input.next_line(), if !self.input_closed => match line? {
                Some(line) => Self::on_line(&line),
                None => {
                    self.input_closed = true;
                    Ok(Some(AppEvent::Quit))
                },
            },
            _ = self.tick.tick() => Ok(Some(AppEvent::Tick)),
        }
    }

    async fn connect(&mut self) -> Result<(), Self::Error> {
        Ok(self.handle.connect(&self.credential).await?)
    }

    async fn subscribe(&mut self, topic: TopicKey) -> Result<SubscriptionToken, Self::Error> {
        let events = self.events_tx.clone();
        let handler = Bridge::handler(topic, move |event| {
            let _ = events.send(event);
        });
        Ok(self.handle.subscribe(topic, handler).await?)
    }

    async fn unsubscribe(&mut self, token: SubscriptionToken) -> Result<bool, Self::Error> {
        Ok(self.handle.unsubscribe(token).await?)
    }

    async fn send_room_message(&mut self, room: RoomId, content: &str) -> Result<bool, Self::Error> {
        Ok(self.handle.send_room_message(room, content).await?)
    }

    fn scroll_to(&mut self, message_id: MessageId) {
        self.transcript.scroll_to(message_id);
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        let lines = self.transcript.update(app);
        if !lines.is_empty() {
            Self::print(&lines)?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = Self::print(&["-- bye".to_string()]) {
            tracing::debug!(error = %e, "final write failed");
        }
    }
}
