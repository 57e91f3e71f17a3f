//! The framer must never panic, never emit a frame longer than the limit,
//! and always resynchronize: feeding arbitrary bytes in arbitrary chunk
//! sizes produces a finite event stream.

#![no_main]

use hackvr_proto::{Framer, FramerEvent, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut framer = Framer::new();
    // First byte picks the chunking so splits land on random boundaries.
    let chunk = usize::from(data.first().copied().unwrap_or(1)).max(1);
    for piece in data.chunks(chunk) {
        framer.push(piece);
        while let Some(event) = framer.next_event() {
            if let FramerEvent::Frame(frame) = event {
                assert!(frame.len() + 2 <= MAX_FRAME_SIZE);
                assert!(!frame.contains('\r'));
            }
        }
    }
});
