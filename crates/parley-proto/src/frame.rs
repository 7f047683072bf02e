//! STOMP frame type with encode and decode.
//!
//! Wire layout:
//!
//! ```text
//! COMMAND\n
//! name:value\n        (zero or more, escaped unless CONNECT/CONNECTED)
//! \n
//! body bytes\0
//! ```
//!
//! Lines may end in `\r\n` on input; output always uses `\n`. The body ends at
//! the first NUL unless a `content-length` header says otherwise, in which
//! case the body may itself contain NUL bytes.

use std::borrow::Cow;

use bytes::{BufMut, Bytes};

use crate::{
    Command,
    errors::{ProtocolError, Result},
};

/// Largest frame accepted or produced (1 MiB).
///
/// Chat bodies are small JSON documents; anything near this size is a broken
/// or hostile peer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Header carrying the body length.
pub(crate) const CONTENT_LENGTH: &str = "content-length";

/// One STOMP frame.
///
/// Headers keep wire order. When a header repeats, [`Frame::header`] returns
/// the first occurrence, as STOMP 1.2 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command
    pub command: Command,
    /// Headers in wire order (unescaped)
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Bytes,
}

impl Frame {
    /// Frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`. `None` if absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// `subscription` header (routing key of a MESSAGE).
    pub fn subscription(&self) -> Option<&str> {
        self.header("subscription")
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Client handshake carrying a bearer credential.
    ///
    /// `heart_beat` is `(outgoing_ms, incoming_ms)` as offered by the client.
    #[must_use]
    pub fn connect(host: &str, token: &str, heart_beat: (u64, u64)) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1")
            .with_header("host", host)
            .with_header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
            .with_header("Authorization", format!("Bearer {token}"))
    }

    /// Subscribe `id` to `destination`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// Cancel subscription `id`.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// Publish `body` to `destination`.
    #[must_use]
    pub fn send(destination: &str, body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        let mut frame = Self::new(Command::Send).with_header("destination", destination);
        if let Some(content_type) = content_type {
            frame = frame.with_header("content-type", content_type);
        }
        frame.with_body(body)
    }

    /// Graceful close.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Broker handshake reply.
    #[must_use]
    pub fn connected(session: &str, heart_beat: (u64, u64)) -> Self {
        Self::new(Command::Connected)
            .with_header("version", "1.2")
            .with_header("session", session)
            .with_header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
    }

    /// Broker delivery for `subscription`.
    #[must_use]
    pub fn message(
        subscription: &str,
        destination: &str,
        message_id: &str,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("message-id", message_id)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Broker error.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new(Command::Error).with_header("message", message)
    }

    /// Parse the `heart-beat` header into `(cx, cy)` milliseconds.
    ///
    /// Missing or malformed values read as `(0, 0)`, meaning "no heartbeats".
    pub fn heart_beat(&self) -> (u64, u64) {
        let Some(value) = self.header("heart-beat") else {
            return (0, 0);
        };
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>().ok());
        match (parts.next().flatten(), parts.next().flatten()) {
            (Some(x), Some(y)) => (x, y),
            _ => (0, 0),
        }
    }

    /// Encode into `dst`.
    ///
    /// Writes a `content-length` header for non-empty bodies unless one is
    /// already present.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnencodableHeader` if a handshake header contains a
    ///   line break (handshake headers are not escaped)
    /// - `ProtocolError::FrameTooLarge` if the encoded frame exceeds
    ///   [`MAX_FRAME_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());

        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');

        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(b':');
                push_escaped(&mut out, value);
            } else {
                if name.contains(':') || name.contains(['\n', '\r']) {
                    return Err(ProtocolError::UnencodableHeader {
                        name: name.clone(),
                        reason: "handshake header name contains ':' or a line break",
                    });
                }
                if value.contains(['\n', '\r']) {
                    return Err(ProtocolError::UnencodableHeader {
                        name: name.clone(),
                        reason: "handshake header value contains a line break",
                    });
                }
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }

        if !self.body.is_empty() && self.header(CONTENT_LENGTH).is_none() {
            out.extend_from_slice(format!("{CONTENT_LENGTH}:{}\n", self.body.len()).as_bytes());
        }

        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);

        if out.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: out.len(), max: MAX_FRAME_SIZE });
        }

        dst.put_slice(&out);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Encode as text for a WebSocket text message.
    ///
    /// Non-UTF-8 bodies are replaced lossily; chat bodies are JSON.
    pub fn to_text(&self) -> Result<String> {
        let bytes = self.to_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode exactly one frame from `bytes`.
    ///
    /// Leading end-of-line heartbeats are skipped; trailing bytes after the
    /// NUL terminator are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTruncated` if `bytes` ends mid-frame
    /// - any parse error from the frame grammar
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let start = bytes.iter().position(|b| *b != b'\n' && *b != b'\r').unwrap_or(bytes.len());
        let rest = &bytes[start..];
        match parse(rest, MAX_FRAME_SIZE)? {
            Some((frame, _consumed)) => Ok(frame),
            None => Err(ProtocolError::FrameTruncated { expected: 1, actual: 0 }),
        }
    }
}

/// Parse one frame from the start of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet hold a complete frame, otherwise
/// the frame and the number of bytes it occupied (including the NUL).
pub(crate) fn parse(buf: &[u8], max_size: usize) -> Result<Option<(Frame, usize)>> {
    let mut pos = 0;

    let Some(command_line) = next_line(buf, &mut pos) else {
        return check_partial(buf, max_size);
    };
    let command: Command = std::str::from_utf8(command_line)
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .parse()?;

    let escape = command.escapes_headers();
    let mut headers = Vec::new();
    loop {
        let Some(line) = next_line(buf, &mut pos) else {
            return check_partial(buf, max_size);
        };
        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        let Some((name, value)) = line.split_once(':') else {
            return Err(ProtocolError::MalformedHeader(line.to_string()));
        };
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let declared = headers
        .iter()
        .find(|(n, _)| n == CONTENT_LENGTH)
        .map(|(_, v)| {
            v.trim().parse::<usize>().map_err(|_| ProtocolError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let body_start = pos;
    let (body_end, consumed) = match declared {
        Some(len) => {
            if len > max_size {
                return Err(ProtocolError::FrameTooLarge { size: len, max: max_size });
            }
            let end = body_start + len;
            if buf.len() <= end {
                return check_partial(buf, max_size);
            }
            if buf[end] != 0 {
                return Err(ProtocolError::MissingTerminator);
            }
            (end, end + 1)
        },
        None => match buf[body_start..].iter().position(|b| *b == 0) {
            Some(offset) => (body_start + offset, body_start + offset + 1),
            None => return check_partial(buf, max_size),
        },
    };

    if consumed > max_size {
        return Err(ProtocolError::FrameTooLarge { size: consumed, max: max_size });
    }

    let body = Bytes::copy_from_slice(&buf[body_start..body_end]);
    Ok(Some((Frame { command, headers, body }, consumed)))
}

/// Incomplete input: fine unless it already exceeds the limit.
fn check_partial(buf: &[u8], max_size: usize) -> Result<Option<(Frame, usize)>> {
    if buf.len() > max_size {
        return Err(ProtocolError::FrameTooLarge { size: buf.len(), max: max_size });
    }
    Ok(None)
}

/// Next `\n`-terminated line starting at `pos`, without the EOL.
fn next_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = buf.get(*pos..)?;
    let newline = rest.iter().position(|b| *b == b'\n')?;
    *pos += newline + 1;
    let line = &rest[..newline];
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

fn push_escaped(out: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            ':' => out.extend_from_slice(b"\\c"),
            c => {
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            },
        }
    }
}

fn unescape(s: &str) -> Result<String> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(ProtocolError::InvalidEscape(other)),
            None => return Err(ProtocolError::MalformedHeader(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_send_frame() {
        let frame = Frame::send("/app/chat/send", "{}", Some("application/json"));
        let text = frame.to_text().unwrap();
        assert_eq!(
            text,
            "SEND\ndestination:/app/chat/send\ncontent-type:application/json\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn empty_body_has_no_content_length() {
        let text = Frame::unsubscribe("sub-0").to_text().unwrap();
        assert_eq!(text, "UNSUBSCRIBE\nid:sub-0\n\n\0");
    }

    #[test]
    fn connect_carries_bearer_and_heartbeat() {
        let frame = Frame::connect("localhost", "tok", (10_000, 10_000));
        assert_eq!(frame.header("Authorization"), Some("Bearer tok"));
        assert_eq!(frame.heart_beat(), (10_000, 10_000));
        assert_eq!(frame.header("accept-version"), Some("1.2,1.1"));
    }

    #[test]
    fn message_headers_are_escaped() {
        let frame = Frame::new(Command::Message).with_header("note", "a:b\nc\\");
        let text = frame.to_text().unwrap();
        assert!(text.contains("note:a\\cb\\nc\\\\\n"));

        let decoded = Frame::decode(text.as_bytes()).unwrap();
        assert_eq!(decoded.header("note"), Some("a:b\nc\\"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let raw = b"CONNECTED\nversion:1.2\nserver:a\\cb\n\n\0";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.header("server"), Some("a\\cb"));
    }

    #[test]
    fn handshake_value_with_newline_is_rejected() {
        let frame = Frame::connect("localhost", "bad\ntoken", (0, 0));
        assert!(matches!(frame.to_bytes(), Err(ProtocolError::UnencodableHeader { .. })));
    }

    #[test]
    fn decode_accepts_crlf() {
        let raw = b"MESSAGE\r\nsubscription:sub-1\r\ndestination:/topic/room/7\r\n\r\nhi\0";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.subscription(), Some("sub-1"));
        assert_eq!(frame.body_text(), "hi");
    }

    #[test]
    fn repeated_header_keeps_first_value() {
        let raw = b"MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.header("foo"), Some("first"));
        assert_eq!(frame.headers.len(), 2);
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let raw = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(&frame.body[..], b"a\0b");
    }

    #[test]
    fn content_length_without_terminator_is_rejected() {
        let raw = b"MESSAGE\ncontent-length:1\n\nab\0";
        assert_eq!(Frame::decode(raw), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert!(matches!(
            Frame::decode(b"MESSAGE\ndestination:/x\n\nbody"),
            Err(ProtocolError::FrameTruncated { .. })
        ));
    }

    #[test]
    fn invalid_escape_is_rejected() {
        let raw = b"MESSAGE\nfoo:a\\tb\n\n\0";
        assert_eq!(Frame::decode(raw), Err(ProtocolError::InvalidEscape('t')));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let frame = Frame::send("/x", vec![b'a'; MAX_FRAME_SIZE], None);
        assert!(matches!(frame.to_bytes(), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn malformed_heartbeat_header_reads_as_zero() {
        let frame = Frame::new(Command::Connected).with_header("heart-beat", "abc");
        assert_eq!(frame.heart_beat(), (0, 0));
        assert_eq!(Frame::new(Command::Connected).heart_beat(), (0, 0));
    }
}
