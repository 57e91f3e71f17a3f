//! End-to-end protocol scenarios, driving the sans-IO server driver and a
//! viewer against each other in memory on a virtual clock.

use std::time::Duration;

use hackvr_client::{Viewer, ViewerAction, ViewerEvent};
use hackvr_core::{ClientAuthenticator, IdentityLookup, ResumePolicy, env::testing::TestEnv};
use hackvr_proto::{Command, Framer, FramerEvent, Ident, SessionToken, UserId};
use hackvr_server::{
    HostEvent, ServerAction, ServerConfig, ServerDriver, ServerEvent, TransportKind,
};

type Instant = Duration;

fn t(secs: u64) -> Instant {
    Duration::from_secs(secs)
}

struct Keys(Option<(String, ed25519_dalek::VerifyingKey)>);

impl IdentityLookup for Keys {
    fn verifying_key(&self, user: &UserId) -> Option<ed25519_dalek::VerifyingKey> {
        self.0.as_ref().filter(|(name, _)| name == user.as_str()).map(|(_, key)| *key)
    }
}

fn driver_with(keys: Keys, config: ServerConfig) -> ServerDriver<TestEnv, Keys> {
    ServerDriver::new(TestEnv::default(), keys, config)
}

fn driver() -> ServerDriver<TestEnv, Keys> {
    driver_with(Keys(None), ServerConfig::default())
}

/// Feed one wire line (with CRLF) from the client.
fn client_line(
    driver: &mut ServerDriver<TestEnv, Keys>,
    conn: u64,
    line: &str,
    now: Instant,
) -> Vec<ServerAction> {
    driver.handle(ServerEvent::Bytes {
        conn,
        bytes: format!("{line}\r\n").into_bytes(),
        now,
    })
}

fn establish_raw(driver: &mut ServerDriver<TestEnv, Keys>, conn: u64) -> Vec<ServerAction> {
    driver.handle(ServerEvent::Accepted { conn, transport: TransportKind::Raw });
    client_line(driver, conn, "hackvr-hello\tv2\thackvr://example/world", t(0))
}

fn sent_lines(actions: &[ServerAction]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::Send { bytes, .. } => {
                Some(String::from_utf8(bytes.clone()).unwrap().trim_end().to_owned())
            }
            _ => None,
        })
        .collect()
}

fn host_events(actions: &[ServerAction]) -> Vec<&HostEvent> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::Host(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn closed(actions: &[ServerAction]) -> bool {
    actions.iter().any(|a| matches!(a, ServerAction::Close { .. }))
}

#[test]
fn hello_handshake_negotiates_and_establishes() {
    let mut driver = driver();
    let actions = establish_raw(&mut driver, 1);

    // Server caps at v1 even though the client offered v2.
    assert_eq!(sent_lines(&actions), ["hackvr-hello\tv1"]);
    assert!(matches!(host_events(&actions)[0], HostEvent::Established { conn: 1 }));
    assert_eq!(driver.effective_user(1).unwrap(), UserId::anonymous());
}

#[test]
fn chat_before_hello_closes_the_connection() {
    let mut driver = driver();
    driver.handle(ServerEvent::Accepted { conn: 1, transport: TransportKind::Raw });
    let actions = client_line(&mut driver, 1, "chat\thello", t(0));
    assert!(closed(&actions));
    assert_eq!(driver.connection_count(), 0);
}

#[test]
fn framing_violation_during_establishment_is_fatal_but_not_after() {
    {
        let mut driver = driver();
        driver.handle(ServerEvent::Accepted { conn: 1, transport: TransportKind::Raw });
        let actions = driver
            .handle(ServerEvent::Bytes { conn: 1, bytes: b"bad\rbad\r\n".to_vec(), now: t(0) });
        assert!(closed(&actions));
    }

    // Same damage post-establishment only costs the frame.
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    let actions =
        driver.handle(ServerEvent::Bytes { conn: 1, bytes: b"bad\rbad\r\n".to_vec(), now: t(1) });
    assert!(!closed(&actions));
    let actions = client_line(&mut driver, 1, "chat\tstill here", t(1));
    assert!(matches!(host_events(&actions)[0], HostEvent::Chat { message, .. } if message == "still here"));
}

#[test]
fn http_upgrade_establishes_and_streams_immediately() {
    let mut driver = driver();
    driver.handle(ServerEvent::Accepted { conn: 1, transport: TransportKind::HttpUpgrade });

    // Preface plus a first command in the same bytes.
    let wire = b"GET /world HTTP/1.1\r\n\
        Host: example\r\n\
        Connection: upgrade\r\n\
        Upgrade: hackvr\r\n\
        HackVr-Version: v1\r\n\
        \r\n\
        chat\thello\r\n";
    let actions = driver.handle(ServerEvent::Bytes { conn: 1, bytes: wire.to_vec(), now: t(0) });

    let lines = sent_lines(&actions);
    assert!(lines[0].starts_with("HTTP/1.1 101 Switching Protocols"));
    let events = host_events(&actions);
    assert!(matches!(events[0], HostEvent::Established { .. }));
    assert!(matches!(events[1], HostEvent::Chat { message, .. } if message == "hello"));
}

#[test]
fn http_upgrade_without_headers_is_refused() {
    let mut driver = driver();
    driver.handle(ServerEvent::Accepted { conn: 1, transport: TransportKind::HttpUpgrade });
    let wire = b"GET /world HTTP/1.1\r\nHost: example\r\n\r\n";
    let actions = driver.handle(ServerEvent::Bytes { conn: 1, bytes: wire.to_vec(), now: t(0) });
    assert!(sent_lines(&actions)[0].starts_with("HTTP/1.1 400"));
    assert!(closed(&actions));
}

#[test]
fn auth_cycle_accepts_a_real_signature() {
    let signing = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
    let alice = UserId::parse("alice").unwrap();
    let mut driver = driver_with(
        Keys(Some(("alice".into(), signing.verifying_key()))),
        ServerConfig::default(),
    );
    establish_raw(&mut driver, 1);

    // Host opens the cycle.
    let actions = driver.author(1, &Command::RequestUser { prompt: Some("login".into()) }, t(1));
    assert_eq!(sent_lines(&actions), ["request-user\tlogin"]);

    // A viewer with the matching key answers the whole exchange.
    let mut viewer: Viewer<Instant> =
        Viewer::new(Some(ClientAuthenticator::new(alice.clone(), signing)));

    let actions = viewer.handle(ViewerEvent::Line { frame: "request-user\tlogin".into(), now: t(1) });
    let set_user = match &actions[1] {
        ViewerAction::Send(command) => command.encode().unwrap(),
        other => panic!("expected send, got {other:?}"),
    };
    let actions = client_line(&mut driver, 1, &set_user, t(1));
    let challenge = sent_lines(&actions);
    assert!(challenge[0].starts_with("request-authentication\talice\t"));

    let actions =
        viewer.handle(ViewerEvent::Line { frame: challenge[0].clone(), now: t(2) });
    let authenticate = match &actions[0] {
        ViewerAction::Send(command) => command.encode().unwrap(),
        other => panic!("expected send, got {other:?}"),
    };
    let actions = client_line(&mut driver, 1, &authenticate, t(2));
    assert_eq!(sent_lines(&actions), ["accept-user\talice"]);
    assert!(matches!(host_events(&actions)[0], HostEvent::UserChanged { user, .. } if *user == alice));
    assert_eq!(driver.effective_user(1).unwrap(), alice);
}

#[test]
fn tampered_signature_is_rejected_uniformly() {
    let signing = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
    let mut driver = driver_with(
        Keys(Some(("alice".into(), signing.verifying_key()))),
        ServerConfig::default(),
    );
    establish_raw(&mut driver, 1);

    driver.author(1, &Command::RequestUser { prompt: None }, t(1));
    let actions = client_line(&mut driver, 1, "set-user\talice", t(1));
    let challenge = sent_lines(&actions);
    let nonce_hex = challenge[0].rsplit('\t').next().unwrap();

    // Signature over the right input, flipped one bit.
    let message = format!("hackvr-auth-v1:alice:{nonce_hex}");
    use ed25519_dalek::Signer;
    let mut sig = signing.sign(message.as_bytes()).to_bytes();
    sig[10] ^= 1;
    let line = format!("authenticate\talice\t{}", hex::encode(sig));
    let actions = client_line(&mut driver, 1, &line, t(2));
    assert_eq!(sent_lines(&actions), ["reject-user\talice\trejected"]);
    assert_eq!(driver.effective_user(1).unwrap(), UserId::anonymous());
}

#[test]
fn anonymous_set_user_needs_no_challenge() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    driver.author(1, &Command::RequestUser { prompt: None }, t(1));
    let actions = client_line(&mut driver, 1, "set-user\t$anonymous", t(1));
    assert_eq!(sent_lines(&actions), ["accept-user\t$anonymous"]);
}

#[test]
fn minimal_scene_pick_round_trip() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    let mut viewer: Viewer<Instant> = Viewer::new(None);

    let scene_script = [
        "create-object\troom",
        "add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)",
        "set-object-property\t$global\tclickable\ttrue",
        "set-object-property\troom\tclickable\ttrue",
    ];
    for line in scene_script {
        let command = Command::parse(line, hackvr_proto::Sender::Server).unwrap();
        let actions = driver.author(1, &command, t(1));
        assert_eq!(sent_lines(&actions), [line], "author should forward {line}");
        viewer.handle(ViewerEvent::Line { frame: line.into(), now: t(1) });
    }

    // Viewer picks the floor triangle of $global.
    let actions = viewer.handle(ViewerEvent::Pick {
        object: Ident::parse("$global").unwrap(),
        kind: hackvr_proto::TapKind::Primary,
        target: hackvr_client::PickTarget::Triangle {
            tag: Some(hackvr_proto::Tag::parse("floor").unwrap()),
        },
    });
    let tap = match &actions[0] {
        ViewerAction::Send(command) => command.encode().unwrap(),
        other => panic!("expected send, got {other:?}"),
    };
    assert_eq!(tap, "tap-object\t$global\tprimary\tfloor");

    let actions = client_line(&mut driver, 1, &tap, t(2));
    assert!(matches!(
        host_events(&actions)[0],
        HostEvent::Tap { object, .. } if object.as_str() == "$global"
    ));
}

#[test]
fn tap_on_unclickable_object_is_dropped_server_side() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    let command = Command::parse("create-object\troom", hackvr_proto::Sender::Server).unwrap();
    driver.author(1, &command, t(1));

    let actions = client_line(&mut driver, 1, "tap-object\troom\tprimary\tfloor", t(2));
    assert!(host_events(&actions).is_empty());
}

#[test]
fn selector_expansion_makes_exactly_the_population() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);

    let create = Command::parse("create-object\tdoor-{01..03}", hackvr_proto::Sender::Server).unwrap();
    driver.author(1, &create, t(1));
    let mark =
        Command::parse("set-object-property\tdoor-*\tclickable\ttrue", hackvr_proto::Sender::Server)
            .unwrap();
    driver.author(1, &mark, t(1));

    let scene = driver.scene(1).unwrap();
    for name in ["door-01", "door-02", "door-03"] {
        let object = scene.object(&Ident::parse(name).unwrap()).unwrap();
        assert!(object.properties().clickable, "{name}");
    }
    assert!(scene.object(&Ident::parse("door").unwrap()).is_none());
}

#[test]
fn raycast_mode_round_trip() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    let mut viewer: Viewer<Instant> = Viewer::new(None);

    // Without a request the ray is dropped server-side too.
    let actions = client_line(&mut driver, 1, "raycast\t(0 0 0)\t(0 0 -1)", t(1));
    assert!(host_events(&actions).is_empty());

    let request = Command::RaycastRequest;
    let actions = driver.author(1, &request, t(1));
    assert_eq!(sent_lines(&actions), ["raycast-request"]);
    viewer.handle(ViewerEvent::Line { frame: "raycast-request".into(), now: t(1) });

    let actions = viewer.handle(ViewerEvent::FireRay {
        origin: glam::Vec3::ZERO,
        direction: glam::Vec3::NEG_Z,
    });
    let ray = match &actions[0] {
        ViewerAction::Send(command) => command.encode().unwrap(),
        other => panic!("expected send, got {other:?}"),
    };
    let actions = client_line(&mut driver, 1, &ray, t(2));
    assert!(matches!(host_events(&actions)[0], HostEvent::Ray { .. }));

    // The mode exited with the ray; a replay is invalid.
    let actions = client_line(&mut driver, 1, &ray, t(3));
    assert!(host_events(&actions).is_empty());
}

#[test]
fn send_input_requires_open_mode() {
    let mut driver = driver();
    establish_raw(&mut driver, 1);

    let actions = client_line(&mut driver, 1, "send-input\thello", t(1));
    assert!(host_events(&actions).is_empty());

    driver.author(1, &Command::RequestInput { prompt: None }, t(1));
    let actions = client_line(&mut driver, 1, "send-input\thello", t(1));
    assert!(matches!(host_events(&actions)[0], HostEvent::Input { text, .. } if text == "hello"));

    // Submission closed the mode.
    let actions = client_line(&mut driver, 1, "send-input\tagain", t(2));
    assert!(host_events(&actions).is_empty());
}

#[test]
fn session_announce_resume_and_revoke() {
    let mut driver = driver_with(
        Keys(None),
        ServerConfig { resume_policy: ResumePolicy::TrustToken, ..ServerConfig::default() },
    );
    establish_raw(&mut driver, 1);

    let actions = driver.announce_new_session(1, t(1));
    let lines = sent_lines(&actions);
    let token_text = lines[0].strip_prefix("announce-session\t").unwrap().to_owned();
    let token = SessionToken::parse(&token_text).unwrap();

    // A second connection to the same origin resumes it.
    let mut actions = Vec::new();
    driver.handle(ServerEvent::Accepted { conn: 2, transport: TransportKind::Raw });
    actions.extend(client_line(
        &mut driver,
        2,
        &format!("hackvr-hello\tv1\thackvr://example/world\t{token_text}"),
        t(2),
    ));
    assert!(
        actions
            .iter()
            .any(|a| matches!(a, ServerAction::Host(HostEvent::UserChanged { conn: 2, .. })))
    );

    // Revocation kills it world-wide.
    driver.author(1, &Command::RevokeSession { token }, t(3));
    driver.handle(ServerEvent::Accepted { conn: 3, transport: TransportKind::Raw });
    let actions = client_line(
        &mut driver,
        3,
        &format!("hackvr-hello\tv1\thackvr://example/world\t{token_text}"),
        t(4),
    );
    assert!(
        !actions
            .iter()
            .any(|a| matches!(a, ServerAction::Host(HostEvent::UserChanged { .. })))
    );
}

#[test]
fn resume_from_wrong_origin_is_rejected() {
    let mut driver = driver_with(
        Keys(None),
        ServerConfig { resume_policy: ResumePolicy::TrustToken, ..ServerConfig::default() },
    );
    establish_raw(&mut driver, 1);
    let actions = driver.announce_new_session(1, t(1));
    let token_text =
        sent_lines(&actions)[0].strip_prefix("announce-session\t").unwrap().to_owned();

    driver.handle(ServerEvent::Accepted { conn: 2, transport: TransportKind::Raw });
    let actions = client_line(
        &mut driver,
        2,
        &format!("hackvr-hello\tv1\thackvr://example/other-world\t{token_text}"),
        t(2),
    );
    assert!(
        !actions
            .iter()
            .any(|a| matches!(a, ServerAction::Host(HostEvent::UserChanged { .. })))
    );
}

#[test]
fn wire_frames_from_author_reparse() {
    // Whatever the server authors must survive its own codec.
    let mut driver = driver();
    establish_raw(&mut driver, 1);
    let commands = [
        Command::Chat { message: "hi".into() },
        Command::parse("create-object\tdoor-{1..3}", hackvr_proto::Sender::Server).unwrap(),
        Command::parse("set-object-transform\tdoor-1\t(1 0 0)\t\t\t2", hackvr_proto::Sender::Server)
            .unwrap(),
    ];
    for command in commands {
        let actions = driver.author(1, &command, t(1));
        for line in sent_lines(&actions) {
            let mut framer = Framer::new();
            framer.push(format!("{line}\r\n").as_bytes());
            match framer.next_event() {
                Some(FramerEvent::Frame(frame)) => {
                    Command::parse(&frame, hackvr_proto::Sender::Server).unwrap();
                }
                other => panic!("framer rejected authored line: {other:?}"),
            }
        }
    }
}
