//! Arbitrary command streams against the scene: whatever the wire throws
//! at it, the scene never panics, `$global`/`$camera` survive, and every
//! object still reaches the root.

#![no_main]

use std::time::Duration;

use hackvr_proto::{Command, Ident, Sender};
use hackvr_scene::SceneState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|frames: Vec<&str>| {
    let mut scene: SceneState<Duration> = SceneState::default();
    for (step, frame) in frames.iter().enumerate() {
        let Ok(command) = Command::parse(frame, Sender::Server) else {
            continue;
        };
        let now = Duration::from_millis(step as u64);
        let _ = scene.apply(&command, now);
    }

    let now = Duration::from_secs(1_000);
    assert!(scene.object(&Ident::global()).is_some());
    assert!(scene.object(&Ident::camera()).is_some());
    let ids: Vec<Ident> = scene.object_ids().cloned().collect();
    for id in ids {
        assert!(scene.world_transform(&id, now).is_some());
    }
});
