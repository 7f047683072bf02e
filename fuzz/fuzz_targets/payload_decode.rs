//! Fuzz target for topic payload translation
//!
//! Broker bodies are JSON produced by a server we do not control. Every
//! topic's translation must reject what it cannot read.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error
//! or no event.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_app::Bridge;
use parley_proto::{Payload, TopicKey};

fuzz_target!(|data: &[u8]| {
    let payload = Payload::decode(data);
    let topics = [TopicKey::RoomsIndex, TopicKey::Room(1), TopicKey::RoomRead(u64::MAX)];

    for topic in topics {
        let _ = Bridge::translate(topic, &payload);
    }
});
