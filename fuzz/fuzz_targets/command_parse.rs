//! Command parsing over arbitrary frame text: no panics, and anything that
//! parses must re-encode into a line that parses back to the same command.

#![no_main]

use hackvr_proto::{Command, Sender};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|frame: &str| {
    for sender in [Sender::Server, Sender::Client] {
        if let Ok(command) = Command::parse(frame, sender) {
            if let Ok(encoded) = command.encode() {
                let reparsed = Command::parse(&encoded, sender)
                    .expect("canonical encoding must reparse");
                assert_eq!(reparsed, command);
            }
        }
    }
});
