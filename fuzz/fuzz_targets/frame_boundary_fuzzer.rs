//! Fuzz target for stream framing
//!
//! Frames arrive over a WebSocket in arbitrary pieces. The decoder must not
//! care where the pieces split.
//!
//! # Strategy
//!
//! - Valid frames built from arbitrary commands, headers and bodies
//! - Heart-beat EOLs between frames
//! - Arbitrary split points, including one byte at a time
//! - Trailing garbage after the valid prefix
//!
//! # Invariants
//!
//! - Chunked decoding yields exactly the frames that were encoded
//! - Heart-beats are reported, never mistaken for frames
//! - Garbage yields an error or more input needed, NEVER a panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Command, Frame, FrameDecoder, Inbound};

#[derive(Debug, Clone, Arbitrary)]
struct Stream {
    items: Vec<Item>,
    /// Chunk sizes, cycled; zero is treated as one
    splits: Vec<u8>,
    garbage: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Item {
    Heartbeat,
    Frame { command: u8, headers: Vec<(String, String)>, body: Vec<u8> },
}

const COMMANDS: [Command; 10] = [
    Command::Connect,
    Command::Stomp,
    Command::Connected,
    Command::Send,
    Command::Subscribe,
    Command::Unsubscribe,
    Command::Disconnect,
    Command::Message,
    Command::Receipt,
    Command::Error,
];

fuzz_target!(|stream: Stream| {
    let mut wire = Vec::new();
    let mut expected = Vec::new();

    for item in stream.items.into_iter().take(32) {
        match item {
            Item::Heartbeat => {
                wire.push(b'\n');
                expected.push(Inbound::Heartbeat);
            },
            Item::Frame { command, headers, body } => {
                let command = COMMANDS[usize::from(command) % COMMANDS.len()];
                let mut frame = Frame::new(command).with_body(body);
                for (name, value) in headers.into_iter().take(8) {
                    frame = frame.with_header(name, value);
                }
                // Unencodable frames and frames whose own content-length lies
                // are skipped
                let Ok(bytes) = frame.to_bytes() else {
                    continue;
                };
                let Ok(decoded) = Frame::decode(&bytes) else {
                    continue;
                };
                if decoded.to_bytes().ok().as_ref() != Some(&bytes) {
                    continue;
                }
                wire.extend_from_slice(&bytes);
                expected.push(Inbound::Frame(decoded));
            },
        }
    }

    let mut decoder = FrameDecoder::new();
    let mut got = Vec::new();
    let mut offset = 0;
    let mut split = stream.splits.iter().cycle();
    while offset < wire.len() {
        let size = split.next().map_or(wire.len(), |s| usize::from(*s).max(1));
        let end = (offset + size).min(wire.len());
        decoder.push(&wire[offset..end]);
        offset = end;
        while let Some(item) = decoder.next_item().expect("valid stream must decode") {
            got.push(item);
        }
    }
    assert_eq!(got, expected);

    decoder.push(&stream.garbage);
    for _ in 0..stream.garbage.len() + 1 {
        match decoder.next_item() {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
});
