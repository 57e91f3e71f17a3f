//! Viewer behavior: gating, picks, and the interaction scenarios from the
//! protocol's end-to-end suite.

use std::time::Duration;

use glam::Vec3;
use hackvr_client::{Notice, PickTarget, Viewer, ViewerAction, ViewerEvent};
use hackvr_core::ClientAuthenticator;
use hackvr_proto::{Command, Ident, TapKind, UserId};

type Instant = Duration;

fn t(secs: u64) -> Instant {
    Duration::from_secs(secs)
}

fn viewer() -> Viewer<Instant> {
    Viewer::new(None)
}

fn line(viewer: &mut Viewer<Instant>, frame: &str, now: Instant) -> Vec<ViewerAction> {
    viewer.handle(ViewerEvent::Line { frame: frame.to_owned(), now })
}

fn sent(actions: &[ViewerAction]) -> Vec<&Command> {
    actions
        .iter()
        .filter_map(|a| match a {
            ViewerAction::Send(c) => Some(c),
            _ => None,
        })
        .collect()
}

#[test]
fn minimal_scene_pick_emits_tap() {
    let mut v = viewer();
    line(&mut v, "create-object\troom", t(0));
    line(&mut v, "add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)", t(0));
    line(&mut v, "set-object-property\troom\tclickable\ttrue", t(0));
    // The picked object is `room`; the tag came off the triangle.
    line(&mut v, "set-object-property\t$global\tclickable\ttrue", t(0));

    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("$global").unwrap(),
        kind: TapKind::Primary,
        target: PickTarget::Triangle { tag: Some(hackvr_proto::Tag::parse("floor").unwrap()) },
    });
    let commands = sent(&actions);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].encode().unwrap(), "tap-object\t$global\tprimary\tfloor");
}

#[test]
fn unclickable_objects_and_untagged_triangles_do_not_tap() {
    let mut v = viewer();
    line(&mut v, "create-object\troom", t(0));

    // Not clickable.
    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("room").unwrap(),
        kind: TapKind::Primary,
        target: PickTarget::Triangle { tag: Some(hackvr_proto::Tag::parse("floor").unwrap()) },
    });
    assert!(sent(&actions).is_empty());

    // Clickable but the triangle is untagged.
    line(&mut v, "set-object-property\troom\tclickable\ttrue", t(0));
    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("room").unwrap(),
        kind: TapKind::Primary,
        target: PickTarget::Triangle { tag: None },
    });
    assert!(sent(&actions).is_empty());
}

#[test]
fn sprite_picks_always_carry_a_derived_tag() {
    let mut v = viewer();
    line(&mut v, "create-object\tposter", t(0));
    line(&mut v, "set-object-property\tposter\tclickable\ttrue", t(0));

    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("poster").unwrap(),
        kind: TapKind::Secondary,
        target: PickTarget::Sprite { u: 0.5, v: 0.25 },
    });
    let commands = sent(&actions);
    assert_eq!(commands[0].encode().unwrap(), "tap-object\tposter\tsecondary\t50-25");
}

#[test]
fn href_pick_asks_for_confirmation_not_navigation() {
    let mut v = viewer();
    line(&mut v, "create-object\tportal", t(0));
    line(&mut v, "set-object-property\tportal\thref\thackvr://other.example/world", t(0));

    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("portal").unwrap(),
        kind: TapKind::Primary,
        target: PickTarget::Triangle { tag: None },
    });
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        &actions[0],
        ViewerAction::ConfirmNavigation { url } if url.as_str() == "hackvr://other.example/world"
    ));
}

#[test]
fn tap_wins_over_href_on_one_action() {
    let mut v = viewer();
    line(&mut v, "create-object\tportal", t(0));
    line(&mut v, "set-object-property\tportal\tclickable\ttrue", t(0));
    line(&mut v, "set-object-property\tportal\thref\thttps://example/next", t(0));

    let actions = v.handle(ViewerEvent::Pick {
        object: Ident::parse("portal").unwrap(),
        kind: TapKind::Primary,
        target: PickTarget::Triangle { tag: Some(hackvr_proto::Tag::parse("door").unwrap()) },
    });
    // Exactly one interaction per user action.
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], ViewerAction::Send(Command::TapObject { .. })));
}

#[test]
fn tell_requires_textinput() {
    let mut v = viewer();
    line(&mut v, "create-object\tterminal", t(0));

    let silent = v.handle(ViewerEvent::Tell {
        object: Ident::parse("terminal").unwrap(),
        text: "hello".into(),
    });
    assert!(sent(&silent).is_empty());

    line(&mut v, "set-object-property\tterminal\ttextinput\ttrue", t(0));
    let actions = v.handle(ViewerEvent::Tell {
        object: Ident::parse("terminal").unwrap(),
        text: "hello".into(),
    });
    assert_eq!(sent(&actions)[0].encode().unwrap(), "tell-object\tterminal\thello");
}

#[test]
fn raycast_mode_gates_rays() {
    let mut v = viewer();

    // No request yet: firing does nothing.
    let actions = v.handle(ViewerEvent::FireRay { origin: Vec3::ZERO, direction: Vec3::NEG_Z });
    assert!(sent(&actions).is_empty());

    line(&mut v, "raycast-request", t(0));
    assert!(v.raycast_active());

    let actions = v.handle(ViewerEvent::FireRay { origin: Vec3::ZERO, direction: Vec3::NEG_Z });
    assert_eq!(sent(&actions)[0].encode().unwrap(), "raycast\t(0 0 0)\t(0 0 -1)");
    assert!(!v.raycast_active());

    // Mode exited with the ray; a second one is invalid.
    let actions = v.handle(ViewerEvent::FireRay { origin: Vec3::ZERO, direction: Vec3::NEG_Z });
    assert!(sent(&actions).is_empty());
}

#[test]
fn zero_direction_rays_never_leave_the_viewer() {
    let mut v = viewer();
    line(&mut v, "raycast-request", t(0));
    let actions = v.handle(ViewerEvent::FireRay { origin: Vec3::ZERO, direction: Vec3::ZERO });
    assert!(sent(&actions).is_empty());
    // The mode stays open for a valid attempt.
    assert!(v.raycast_active());
}

#[test]
fn text_input_flow() {
    let mut v = viewer();

    // Submitting outside the mode is invalid.
    assert!(sent(&v.handle(ViewerEvent::SubmitInput { text: "x".into() })).is_empty());

    line(&mut v, "request-input\tsay something", t(0));
    assert!(v.text_input().is_active());
    v.text_input_mut().set_draft("drafting…".into());

    // A replacing request keeps the draft.
    line(&mut v, "request-input\tsay something else", t(1));
    assert_eq!(v.text_input().draft(), "drafting…");

    let actions = v.handle(ViewerEvent::SubmitInput { text: "final words".into() });
    assert_eq!(sent(&actions)[0].encode().unwrap(), "send-input\tfinal words");
    assert!(!v.text_input().is_active());

    // cancel-input closes the reopened mode without sending anything.
    line(&mut v, "request-input", t(2));
    line(&mut v, "cancel-input", t(2));
    assert!(!v.text_input().is_active());
}

#[test]
fn auth_challenge_is_answered_automatically() {
    let signing = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
    let alice = UserId::parse("alice").unwrap();
    let mut v: Viewer<Instant> =
        Viewer::new(Some(ClientAuthenticator::new(alice.clone(), signing)));

    let actions = line(&mut v, "request-user\tlogin required", t(0));
    assert!(matches!(&actions[0], ViewerAction::Notify(Notice::Prompt(Some(p))) if p == "login required"));
    assert_eq!(sent(&actions)[0].encode().unwrap(), "set-user\talice");

    let nonce_hex = "00112233445566778899aabbccddeeff";
    let actions = line(&mut v, &format!("request-authentication\talice\t{nonce_hex}"), t(1));
    let commands = sent(&actions);
    assert_eq!(commands.len(), 1);
    assert!(matches!(commands[0], Command::Authenticate { .. }));
}

#[test]
fn anonymous_viewer_answers_with_anonymous() {
    let mut v = viewer();
    let actions = line(&mut v, "request-user", t(0));
    assert_eq!(sent(&actions)[0].encode().unwrap(), "set-user\t$anonymous");
}

#[test]
fn intents_gate_on_the_registry() {
    let mut v = viewer();
    // Predefined intents work out of the box.
    let actions = v.handle(ViewerEvent::InvokeIntent { intent: Ident::parse("$forward").unwrap() });
    assert_eq!(sent(&actions)[0].encode().unwrap(), "intent\t$forward");

    // Unregistered ones do not leave the viewer.
    let actions = v.handle(ViewerEvent::InvokeIntent { intent: Ident::parse("warp").unwrap() });
    assert!(sent(&actions).is_empty());

    line(&mut v, "create-intent\twarp\tWarp drive", t(0));
    let actions = v.handle(ViewerEvent::InvokeIntent { intent: Ident::parse("warp").unwrap() });
    assert_eq!(sent(&actions)[0].encode().unwrap(), "intent\twarp");
}

#[test]
fn sprite_creation_triggers_one_fetch() {
    let mut v = viewer();
    let sha = "ab".repeat(32);
    let create = format!("create-sprite\tposter\t2\t1\tcenter-center\tcover\thttps://cdn/i.png\t{sha}");
    let actions = line(&mut v, &create, t(0));
    assert!(matches!(actions.as_slice(), [ViewerAction::FetchAsset { .. }]));

    // Duplicate create is dropped, so no second fetch either.
    let actions = line(&mut v, &create, t(1));
    assert!(actions.is_empty());
}

#[test]
fn transport_close_retains_scene_and_notifies() {
    let mut v = viewer();
    line(&mut v, "create-object\troom", t(0));
    line(&mut v, "raycast-request", t(0));

    let actions = v.handle(ViewerEvent::TransportClosed);
    assert_eq!(actions, vec![ViewerAction::Notify(Notice::Disconnected)]);
    assert!(!v.connected());
    // Scene survives; modes are cancelled.
    assert!(v.scene().object(&Ident::parse("room").unwrap()).is_some());
    assert!(!v.raycast_active());
}

#[test]
fn wrong_direction_and_garbage_lines_are_dropped() {
    let mut v = viewer();
    // Client-only command arriving from the server: dropped.
    assert!(line(&mut v, "tap-object\troom\tprimary\tfloor", t(0)).is_empty());
    assert!(line(&mut v, "no-such-command\tx", t(0)).is_empty());
    // The connection is still fine.
    line(&mut v, "create-object\troom", t(0));
    assert!(v.scene().object(&Ident::parse("room").unwrap()).is_some());
}
