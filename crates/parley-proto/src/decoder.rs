//! Streaming frame decoder.
//!
//! WebSocket messages usually carry exactly one frame, but SockJS and some
//! brokers batch several frames or split one across messages. The decoder
//! buffers input and yields whatever is complete.

use bytes::{Buf, BytesMut};

use crate::{
    errors::Result,
    frame::{self, Frame, MAX_FRAME_SIZE},
};

/// Item produced by [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bare end-of-line between frames
    Heartbeat,
    /// A complete frame
    Frame(Frame),
}

/// Incremental decoder over a byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder with the default [`MAX_FRAME_SIZE`] limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Decoder with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { buf: BytesMut::new(), max_frame_size }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial frame (used when the socket is replaced).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Next complete item, or `None` if more input is needed.
    ///
    /// # Errors
    ///
    /// Any [`crate::ProtocolError`] from the frame grammar. The buffer is
    /// cleared on error since resynchronising inside a corrupt stream is not
    /// possible.
    pub fn next_item(&mut self) -> Result<Option<Inbound>> {
        match self.buf.first().copied() {
            None => return Ok(None),
            Some(b'\n') => {
                self.buf.advance(1);
                return Ok(Some(Inbound::Heartbeat));
            },
            Some(b'\r') => {
                return match self.buf.get(1).copied() {
                    None => Ok(None),
                    Some(b'\n') => {
                        self.buf.advance(2);
                        Ok(Some(Inbound::Heartbeat))
                    },
                    Some(_) => self.next_frame(),
                };
            },
            Some(_) => {},
        }
        self.next_frame()
    }

    /// Drain every complete item currently buffered.
    pub fn drain(&mut self) -> Result<Vec<Inbound>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item()? {
            items.push(item);
        }
        Ok(items)
    }

    fn next_frame(&mut self) -> Result<Option<Inbound>> {
        match frame::parse(&self.buf, self.max_frame_size) {
            Ok(Some((frame, consumed))) => {
                self.buf.advance(consumed);
                Ok(Some(Inbound::Frame(frame)))
            },
            Ok(None) => Ok(None),
            Err(e) => {
                self.buf.clear();
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, ProtocolError};

    #[test]
    fn heartbeats_between_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\n\r\nRECEIPT\nreceipt-id:1\n\n\0\n");

        let items = decoder.drain().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Inbound::Heartbeat);
        assert_eq!(items[1], Inbound::Heartbeat);
        assert!(matches!(&items[2], Inbound::Frame(f) if f.command == Command::Receipt));
        assert_eq!(items[3], Inbound::Heartbeat);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn frame_split_across_pushes() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"MESSAGE\nsubscription:sub-0\n");
        assert_eq!(decoder.next_item().unwrap(), None);
        decoder.push(b"\n{\"id\":1}");
        assert_eq!(decoder.next_item().unwrap(), None);
        decoder.push(b"\0");

        let Some(Inbound::Frame(frame)) = decoder.next_item().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.body_text(), "{\"id\":1}");
    }

    #[test]
    fn lone_carriage_return_waits_for_more_input() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\r");
        assert_eq!(decoder.next_item().unwrap(), None);
        decoder.push(b"\n");
        assert_eq!(decoder.next_item().unwrap(), Some(Inbound::Heartbeat));
    }

    #[test]
    fn oversized_partial_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_size(16);
        decoder.push(b"MESSAGE\n\nthis body never ends");
        assert!(matches!(decoder.next_item(), Err(ProtocolError::FrameTooLarge { .. })));
        assert_eq!(decoder.buffered(), 0);
    }
}
