//! Line-oriented user input.
//!
//! Frontends read whole lines; plain text is a message for the active room
//! and lines starting with `/` are commands.

use thiserror::Error;

use crate::AppEvent;

/// Usage text for the commands understood by [`parse_line`].
pub const HELP: &str = "/room <id>  /jump <message id>  /delete <room id>  /rooms  /quit";

/// Why a line was not understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Command name not recognized
    #[error("unknown command /{0}; {HELP}")]
    UnknownCommand(String),
    /// Command needs a numeric argument
    #[error("usage: /{0} <id>")]
    MissingId(&'static str),
}

/// Turn one input line into an event. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<AppEvent>, InputError> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        if line.is_empty() {
            return Ok(None);
        }
        return Ok(Some(AppEvent::SendRequested { content: line.to_string() }));
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let mut id = |command: &'static str| {
        words.next().and_then(|w| w.parse().ok()).ok_or(InputError::MissingId(command))
    };

    let event = match name {
        "room" => AppEvent::SelectRoom(id("room")?),
        "jump" => AppEvent::JumpTo { message_id: id("jump")? },
        "delete" => AppEvent::DeleteRequested { room: id("delete")? },
        "rooms" => AppEvent::RoomsChanged,
        "quit" | "exit" => AppEvent::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_a_message() {
        assert_eq!(
            parse_line("  hello there "),
            Ok(Some(AppEvent::SendRequested { content: "hello there".into() }))
        );
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn commands() {
        assert_eq!(parse_line("/room 7"), Ok(Some(AppEvent::SelectRoom(7))));
        assert_eq!(parse_line("/jump 99"), Ok(Some(AppEvent::JumpTo { message_id: 99 })));
        assert_eq!(parse_line("/quit"), Ok(Some(AppEvent::Quit)));
        assert_eq!(parse_line("/room x"), Err(InputError::MissingId("room")));
        assert!(matches!(parse_line("/dance"), Err(InputError::UnknownCommand(_))));
    }

    #[test]
    fn errors_explain_usage() {
        let unknown = parse_line("/dance").unwrap_err().to_string();
        assert!(unknown.starts_with("unknown command /dance; "));
        assert!(unknown.ends_with(HELP));
        assert_eq!(parse_line("/jump").unwrap_err().to_string(), "usage: /jump <id>");
    }
}
