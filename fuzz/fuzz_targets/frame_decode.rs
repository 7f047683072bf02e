//! Fuzz target for Frame::decode
//!
//! This fuzzer tests frame decoding with arbitrary byte sequences to find:
//! - Parser crashes or panics
//! - Header escapes that do not survive re-encoding
//! - Content-length values that over-read the buffer
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    // Once encoded, a frame must survive decode and encode unchanged
    if let Ok(bytes) = frame.to_bytes() {
        let again = Frame::decode(&bytes).expect("encoded frame must decode");
        assert_eq!(again.to_bytes().ok(), Some(bytes));
    }
});
