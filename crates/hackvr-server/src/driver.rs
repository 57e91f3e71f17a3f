//! Server driver.
//!
//! One `ServerDriver` is the protocol agent for a whole listener: it owns
//! every connection's framer, establishment phase, auth machine, session
//! context, and server-side scene copy, plus the shared session-token
//! registry. It is sans-IO: the transport feeds [`ServerEvent`]s in and
//! executes the returned [`ServerAction`]s; the world application receives
//! viewer interactions as [`HostEvent`]s and authors the scene through
//! [`ServerDriver::author`].
//!
//! Error regimes: before establishment every violation closes the
//! connection; afterwards a bad frame or command is dropped (logged at
//! debug) and the stream continues.

use std::{collections::HashMap, time::Duration};

use glam::Vec3;
use hackvr_core::{
    AnnouncedToken, AuthConfig, Environment, EstablishError, IdentityLookup, Origin, PrefaceBuffer,
    RawServer, ResumeOutcome, ResumePolicy, Scheme, SessionRegistry, build_upgrade_response,
    parse_upgrade_request, session::DEFAULT_TOKEN_TTL,
};
use hackvr_core::auth::ServerAuth;
use hackvr_proto::{
    Command, Framer, FramerEvent, Ident, Sender, SessionToken, Tag, TapKind, UserId,
};
use hackvr_scene::{SceneLimits, SceneState, TransitionReparent};

/// Connection identifier assigned by the transport.
pub type ConnId = u64;

/// Soft limit on inbound commands per second per connection.
pub const DEFAULT_COMMAND_RATE: u32 = 1000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Auth timing.
    pub auth: AuthConfig,
    /// What a matched `resume-session` grants.
    pub resume_policy: ResumePolicy,
    /// Scene resource limits.
    pub scene_limits: SceneLimits,
    /// Transition behavior across `mode=local` reparents.
    pub reparent_policy: TransitionReparent,
    /// Session token lifetime between refreshes.
    pub token_ttl: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Inbound command rate cap per connection.
    pub max_commands_per_sec: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            resume_policy: ResumePolicy::default(),
            scene_limits: SceneLimits::default(),
            reparent_policy: TransitionReparent::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
            max_connections: 10_000,
            max_commands_per_sec: DEFAULT_COMMAND_RATE,
        }
    }
}

/// How a connection arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Raw stream (`hackvr://`); establishment is the hello exchange.
    Raw,
    /// Raw stream over TLS (`hackvrs://`).
    RawTls,
    /// HTTP/1.1 Upgrade, cleartext.
    HttpUpgrade,
    /// HTTP/1.1 Upgrade over TLS.
    HttpsUpgrade,
}

impl TransportKind {
    fn upgrade_scheme(self) -> Option<Scheme> {
        match self {
            Self::Raw | Self::RawTls => None,
            Self::HttpUpgrade => Some(Scheme::HttpUpgrade),
            Self::HttpsUpgrade => Some(Scheme::HttpsUpgrade),
        }
    }
}

/// Events fed by the transport.
#[derive(Debug, Clone)]
pub enum ServerEvent<I> {
    /// A connection was accepted.
    Accepted {
        /// Transport-assigned id.
        conn: ConnId,
        /// How it arrived.
        transport: TransportKind,
    },
    /// Bytes arrived.
    Bytes {
        /// Connection.
        conn: ConnId,
        /// Raw bytes, any chunking.
        bytes: Vec<u8>,
        /// Receipt time.
        now: I,
    },
    /// The transport saw the connection close.
    Closed {
        /// Connection.
        conn: ConnId,
    },
    /// Periodic housekeeping (nonce expiry, token sweeps).
    Tick {
        /// Current time.
        now: I,
    },
}

/// Viewer interactions surfaced to the world application.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A connection finished establishment and wants a world.
    Established {
        /// Connection.
        conn: ConnId,
    },
    /// Chat from the viewer.
    Chat {
        /// Connection.
        conn: ConnId,
        /// Message body.
        message: String,
    },
    /// A gated tap on a clickable object.
    Tap {
        /// Connection.
        conn: ConnId,
        /// Tapped object.
        object: Ident,
        /// Pointer action.
        kind: TapKind,
        /// Picked triangle tag.
        tag: Tag,
    },
    /// Text aimed at a `textinput` object.
    Tell {
        /// Connection.
        conn: ConnId,
        /// Addressed object.
        object: Ident,
        /// The text.
        text: String,
    },
    /// An intent invocation.
    Intent {
        /// Connection.
        conn: ConnId,
        /// Invoked intent.
        intent: Ident,
    },
    /// Submitted text input.
    Input {
        /// Connection.
        conn: ConnId,
        /// The text.
        text: String,
    },
    /// A raycast result.
    Ray {
        /// Connection.
        conn: ConnId,
        /// World-space origin.
        origin: Vec3,
        /// World-space direction, non-zero, not necessarily unit.
        direction: Vec3,
    },
    /// The connection's effective user changed.
    UserChanged {
        /// Connection.
        conn: ConnId,
        /// New effective identity.
        user: UserId,
    },
    /// The connection is gone.
    Disconnected {
        /// Connection.
        conn: ConnId,
    },
}

/// Actions for the transport to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    /// Write bytes to a connection.
    Send {
        /// Connection.
        conn: ConnId,
        /// Bytes, already framed/encoded.
        bytes: Vec<u8>,
    },
    /// Close a connection.
    Close {
        /// Connection.
        conn: ConnId,
        /// Reason, for the log.
        reason: String,
    },
    /// Deliver an event to the world application.
    Host(HostEvent),
}

/// Preface sent back when an HTTP upgrade request is unacceptable.
const UPGRADE_REFUSAL: &str = "HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n";

/// Token bucket for the inbound command rate cap.
///
/// Tokens refill continuously at the configured rate and are capped at one
/// second's worth of burst. Unlike a fixed window, a burst straddling a
/// boundary cannot double the effective limit.
struct TokenBucket<I> {
    tokens: f32,
    last_refill: Option<I>,
}

impl<I> TokenBucket<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn new(rate: u32) -> Self {
        // Start full so a connection's first burst is not penalized.
        Self { tokens: rate as f32, last_refill: None }
    }

    fn allow(&mut self, now: I, rate: u32) -> bool {
        let capacity = rate as f32;
        if let Some(last) = self.last_refill {
            if now > last {
                self.tokens = (self.tokens + (now - last).as_secs_f32() * capacity).min(capacity);
            }
        }
        self.last_refill = Some(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Established per-connection context.
struct Session<I> {
    origin: Origin,
    auth: ServerAuth<I>,
    announced: AnnouncedToken,
    scene: SceneState<I>,
    text_input_open: bool,
    raycast_open: bool,
    rate: TokenBucket<I>,
}

enum Phase<I> {
    AwaitRawHello,
    AwaitUpgrade { scheme: Scheme, preface: PrefaceBuffer },
    Ready(Box<Session<I>>),
}

struct Conn<I> {
    framer: Framer,
    phase: Phase<I>,
}

/// The sans-IO server core.
pub struct ServerDriver<E: Environment, K> {
    env: E,
    keys: K,
    config: ServerConfig,
    registry: SessionRegistry<E::Instant>,
    conns: HashMap<ConnId, Conn<E::Instant>>,
}

impl<E, K> ServerDriver<E, K>
where
    E: Environment,
    E::Instant: std::ops::Add<Duration, Output = E::Instant>,
    K: IdentityLookup,
{
    /// New driver over an identity store.
    pub fn new(env: E, keys: K, config: ServerConfig) -> Self {
        let registry = SessionRegistry::new(config.token_ttl, config.resume_policy);
        Self { env, keys, config, registry, conns: HashMap::new() }
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    /// The effective user of a connection, if established.
    #[must_use]
    pub fn effective_user(&self, conn: ConnId) -> Option<UserId> {
        match &self.conns.get(&conn)?.phase {
            Phase::Ready(session) => Some(session.auth.effective_user().clone()),
            _ => None,
        }
    }

    /// Read access to a connection's authoritative scene copy.
    #[must_use]
    pub fn scene(&self, conn: ConnId) -> Option<&SceneState<E::Instant>> {
        match &self.conns.get(&conn)?.phase {
            Phase::Ready(session) => Some(&session.scene),
            _ => None,
        }
    }

    /// Process one transport event.
    pub fn handle(&mut self, event: ServerEvent<E::Instant>) -> Vec<ServerAction> {
        match event {
            ServerEvent::Accepted { conn, transport } => self.on_accepted(conn, transport),
            ServerEvent::Bytes { conn, bytes, now } => self.on_bytes(conn, &bytes, now),
            ServerEvent::Closed { conn } => {
                if self.conns.remove(&conn).is_some() {
                    vec![ServerAction::Host(HostEvent::Disconnected { conn })]
                } else {
                    Vec::new()
                }
            }
            ServerEvent::Tick { now } => {
                for connection in self.conns.values_mut() {
                    if let Phase::Ready(session) = &mut connection.phase {
                        session.auth.tick(now);
                    }
                }
                self.registry.sweep(now);
                Vec::new()
            }
        }
    }

    /// Author a server→client command on one connection.
    ///
    /// Scene commands are applied to the server's own copy first; a command
    /// the scene drops is not sent (both sides would have dropped it, so
    /// the wire traffic would be noise). Gate commands flip the server's
    /// mirror of the viewer's interaction modes.
    pub fn author(
        &mut self,
        conn: ConnId,
        command: &Command,
        now: E::Instant,
    ) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let Some(connection) = self.conns.get_mut(&conn) else {
            return actions;
        };
        let Phase::Ready(session) = &mut connection.phase else {
            return actions;
        };
        if !command.direction().accepts(Sender::Server) {
            tracing::debug!(conn, command = command.name(), "refusing to author C→S command");
            return actions;
        }

        match command {
            Command::RequestUser { prompt } => {
                match session.auth.begin(prompt.clone()) {
                    Some(reply) => send(&mut actions, conn, &reply),
                    None => {
                        tracing::debug!(conn, "request-user while a cycle is in flight");
                    }
                }
                return actions;
            }
            Command::RequestInput { .. } => session.text_input_open = true,
            Command::CancelInput => session.text_input_open = false,
            Command::RaycastRequest => session.raycast_open = true,
            Command::RaycastCancel => session.raycast_open = false,
            Command::AnnounceSession { token } => {
                if let Some(previous) = session.announced.announce(*token) {
                    self.registry.invalidate(&previous);
                }
                let user = session.auth.effective_user().clone();
                self.registry.announce(*token, session.origin.clone(), user, now);
            }
            Command::RevokeSession { token } => {
                session.announced.revoke(token);
                self.registry.invalidate(token);
            }
            _ => {
                // Pass-through commands (chat, auth replies) are not scene
                // state; everything else must survive the server's own copy
                // before it is worth wire bytes.
                match session.scene.apply(command, now) {
                    hackvr_scene::Outcome::Dropped(hackvr_scene::DropReason::NotSceneCommand) => {}
                    hackvr_scene::Outcome::Dropped(reason) => {
                        tracing::debug!(conn, command = command.name(), %reason, "scene refused authored command");
                        return actions;
                    }
                    hackvr_scene::Outcome::Applied | hackvr_scene::Outcome::NoOp => {}
                }
            }
        }

        send(&mut actions, conn, command);
        actions
    }

    /// Mint a fresh token and announce it on `conn`.
    pub fn announce_new_session(&mut self, conn: ConnId, now: E::Instant) -> Vec<ServerAction> {
        let token = SessionToken::from_bytes(self.env.token_bytes());
        self.author(conn, &Command::AnnounceSession { token }, now)
    }

    fn on_accepted(&mut self, conn: ConnId, transport: TransportKind) -> Vec<ServerAction> {
        if self.conns.len() >= self.config.max_connections {
            return vec![ServerAction::Close { conn, reason: "connection limit".into() }];
        }
        let phase = match transport.upgrade_scheme() {
            None => Phase::AwaitRawHello,
            Some(scheme) => Phase::AwaitUpgrade { scheme, preface: PrefaceBuffer::new() },
        };
        self.conns.insert(conn, Conn { framer: Framer::new(), phase });
        Vec::new()
    }

    fn on_bytes(&mut self, conn: ConnId, bytes: &[u8], now: E::Instant) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let Some(connection) = self.conns.get_mut(&conn) else {
            return actions;
        };

        // The upgrade preface is consumed before any framing exists.
        if let Phase::AwaitUpgrade { scheme, preface } = &mut connection.phase {
            let scheme = *scheme;
            match preface.push(bytes) {
                Ok(None) => return actions,
                Ok(Some((head, leftover))) => match parse_upgrade_request(scheme, &head) {
                    Ok(request) => {
                        actions.push(ServerAction::Send {
                            conn,
                            bytes: build_upgrade_response().into_bytes(),
                        });
                        let resume = request.session;
                        self.establish(conn, request.origin, resume, now, &mut actions);
                        // Anything past the blank line is already stream.
                        if !leftover.is_empty() {
                            let mut more = self.on_bytes(conn, &leftover, now);
                            actions.append(&mut more);
                        }
                        return actions;
                    }
                    Err(error) => {
                        actions.push(ServerAction::Send {
                            conn,
                            bytes: UPGRADE_REFUSAL.as_bytes().to_vec(),
                        });
                        actions.push(close(conn, &error));
                        self.conns.remove(&conn);
                        return actions;
                    }
                },
                Err(error) => {
                    actions.push(close(conn, &error));
                    self.conns.remove(&conn);
                    return actions;
                }
            }
        }

        connection.framer.push(bytes);
        self.drain_frames(conn, now, &mut actions);
        actions
    }

    fn drain_frames(&mut self, conn: ConnId, now: E::Instant, actions: &mut Vec<ServerAction>) {
        loop {
            let Some(connection) = self.conns.get_mut(&conn) else {
                return;
            };
            let Some(event) = connection.framer.next_event() else {
                return;
            };
            match (&mut connection.phase, event) {
                // Establishment is strict: a framing violation is fatal.
                (Phase::AwaitRawHello | Phase::AwaitUpgrade { .. }, FramerEvent::Violation(v)) => {
                    actions.push(close(conn, &EstablishError::Framing(v)));
                    self.conns.remove(&conn);
                    return;
                }
                (Phase::AwaitRawHello, FramerEvent::Frame(frame)) => {
                    match RawServer::new().on_frame(&frame) {
                        Ok((reply, established)) => {
                            send(actions, conn, &reply);
                            let origin = established
                                .client_uri
                                .as_ref()
                                .and_then(|uri| Origin::from_url(uri).ok());
                            match origin {
                                Some(origin) => {
                                    self.establish(conn, origin, established.resume, now, actions);
                                }
                                None => {
                                    actions.push(close(
                                        conn,
                                        &EstablishError::MalformedUpgrade {
                                            reason: "unbindable hello uri",
                                        },
                                    ));
                                    self.conns.remove(&conn);
                                    return;
                                }
                            }
                        }
                        Err(error) => {
                            actions.push(close(conn, &error));
                            self.conns.remove(&conn);
                            return;
                        }
                    }
                }
                (Phase::AwaitUpgrade { .. }, FramerEvent::Frame(_)) => {
                    // Unreachable by construction: upgrade bytes bypass the
                    // framer until establishment. Treat as a deviation.
                    actions.push(close(conn, &EstablishError::TransportClosed));
                    self.conns.remove(&conn);
                    return;
                }
                // Steady state: violations and bad commands cost one frame.
                (Phase::Ready(_), FramerEvent::Violation(violation)) => {
                    tracing::debug!(conn, %violation, "frame dropped");
                }
                (Phase::Ready(_), FramerEvent::Frame(frame)) => {
                    self.on_command_frame(conn, &frame, now, actions);
                }
            }
        }
    }

    fn establish(
        &mut self,
        conn: ConnId,
        origin: Origin,
        resume: Option<SessionToken>,
        now: E::Instant,
        actions: &mut Vec<ServerAction>,
    ) {
        let session = Session {
            origin,
            auth: ServerAuth::new(self.config.auth.clone()),
            announced: AnnouncedToken::default(),
            scene: SceneState::new(
                self.config.scene_limits.clone(),
                self.config.reparent_policy,
            ),
            text_input_open: false,
            raycast_open: false,
            rate: TokenBucket::new(self.config.max_commands_per_sec),
        };
        if let Some(connection) = self.conns.get_mut(&conn) {
            connection.phase = Phase::Ready(Box::new(session));
        }
        tracing::info!(conn, "connection established");
        actions.push(ServerAction::Host(HostEvent::Established { conn }));
        if let Some(token) = resume {
            self.handle_resume(conn, &token, now, actions);
        }
    }

    fn on_command_frame(
        &mut self,
        conn: ConnId,
        frame: &str,
        now: E::Instant,
        actions: &mut Vec<ServerAction>,
    ) {
        let command = match Command::parse(frame, Sender::Client) {
            Ok(command) => command,
            Err(error) => {
                tracing::debug!(conn, %error, "command dropped");
                return;
            }
        };

        let Some(connection) = self.conns.get_mut(&conn) else {
            return;
        };
        let Phase::Ready(session) = &mut connection.phase else {
            return;
        };
        if !session.rate.allow(now, self.config.max_commands_per_sec) {
            tracing::debug!(conn, command = command.name(), "rate limit exceeded");
            return;
        }

        match command {
            Command::Chat { message } => {
                actions.push(ServerAction::Host(HostEvent::Chat { conn, message }));
            }
            Command::SetUser { user } => {
                let nonce = self.env.nonce();
                if let Some(reply) = session.auth.on_set_user(user, nonce, now) {
                    if let Command::AcceptUser { user } = &reply {
                        actions.push(ServerAction::Host(HostEvent::UserChanged {
                            conn,
                            user: user.clone(),
                        }));
                    }
                    send(actions, conn, &reply);
                }
            }
            Command::Authenticate { user, signature } => {
                if let Some(reply) = session.auth.on_authenticate(&user, &signature, now, &self.keys)
                {
                    if let Command::AcceptUser { user } = &reply {
                        actions.push(ServerAction::Host(HostEvent::UserChanged {
                            conn,
                            user: user.clone(),
                        }));
                    }
                    send(actions, conn, &reply);
                }
            }
            Command::ResumeSession { token } => {
                self.handle_resume(conn, &token, now, actions);
            }
            Command::Intent { intent } => {
                if session.scene.intent_label(&intent).is_some() {
                    actions.push(ServerAction::Host(HostEvent::Intent { conn, intent }));
                } else {
                    tracing::debug!(conn, %intent, "intent not registered");
                }
            }
            Command::TapObject { object, kind, tag } => {
                let clickable = session
                    .scene
                    .object(&object)
                    .is_some_and(|o| o.properties().clickable);
                if clickable {
                    actions.push(ServerAction::Host(HostEvent::Tap { conn, object, kind, tag }));
                } else {
                    tracing::debug!(conn, %object, "tap on non-clickable object dropped");
                }
            }
            Command::TellObject { object, text } => {
                let accepts = session
                    .scene
                    .object(&object)
                    .is_some_and(|o| o.properties().textinput);
                if accepts {
                    actions.push(ServerAction::Host(HostEvent::Tell { conn, object, text }));
                } else {
                    tracing::debug!(conn, %object, "tell on non-textinput object dropped");
                }
            }
            Command::SendInput { text } => {
                // Valid only while the mode was open at submission.
                if session.text_input_open {
                    session.text_input_open = false;
                    actions.push(ServerAction::Host(HostEvent::Input { conn, text }));
                } else {
                    tracing::debug!(conn, "send-input outside text-input mode dropped");
                }
            }
            Command::Raycast { origin, direction } => {
                if !session.raycast_open {
                    tracing::debug!(conn, "raycast outside raycast mode dropped");
                } else if direction.length_squared() == 0.0 {
                    tracing::debug!(conn, "zero-direction raycast dropped");
                } else {
                    session.raycast_open = false;
                    actions.push(ServerAction::Host(HostEvent::Ray { conn, origin, direction }));
                }
            }
            Command::RaycastCancel => {
                session.raycast_open = false;
            }
            // A hello after establishment is a stray; the optimistic regime
            // drops it.
            Command::Hello { .. } => {
                tracing::debug!(conn, "hackvr-hello after establishment dropped");
            }
            other => {
                tracing::debug!(conn, command = other.name(), "unhandled C→S command dropped");
            }
        }
    }

    fn handle_resume(
        &mut self,
        conn: ConnId,
        token: &SessionToken,
        now: E::Instant,
        actions: &mut Vec<ServerAction>,
    ) {
        let Some(connection) = self.conns.get_mut(&conn) else {
            return;
        };
        let Phase::Ready(session) = &mut connection.phase else {
            return;
        };
        match self.registry.resume(token, &session.origin, now) {
            ResumeOutcome::Resumed { user } => {
                session.auth.restore(user.clone());
                actions.push(ServerAction::Host(HostEvent::UserChanged { conn, user }));
            }
            ResumeOutcome::ReauthRequired => {
                // Continuity proven; identity still needs a fresh cycle.
                if let Some(request) = session.auth.begin(Some("session resume".to_owned())) {
                    send(actions, conn, &request);
                }
            }
            ResumeOutcome::Rejected => {
                // Indistinguishable from an unknown token on purpose.
                tracing::debug!(conn, "resume-session rejected");
            }
        }
    }
}

fn send(actions: &mut Vec<ServerAction>, conn: ConnId, command: &Command) {
    match command.to_wire() {
        Ok(wire) => actions.push(ServerAction::Send { conn, bytes: wire.into_bytes() }),
        Err(error) => tracing::warn!(conn, %error, "outbound command does not fit a frame"),
    }
}

fn close(conn: ConnId, error: &dyn std::fmt::Display) -> ServerAction {
    tracing::info!(conn, %error, "closing connection");
    ServerAction::Close { conn, reason: error.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Instant = Duration;

    fn at(millis: u64) -> Instant {
        Duration::from_millis(millis)
    }

    #[test]
    fn bucket_allows_an_initial_burst_up_to_capacity() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            assert!(bucket.allow(at(0), 10));
        }
        assert!(!bucket.allow(at(0), 10));
    }

    #[test]
    fn bucket_refills_continuously() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            bucket.allow(at(0), 10);
        }
        assert!(!bucket.allow(at(0), 10));

        // 100 ms at 10/s buys exactly one more command.
        assert!(bucket.allow(at(100), 10));
        assert!(!bucket.allow(at(100), 10));
    }

    #[test]
    fn bucket_has_no_boundary_double_spend() {
        // A fixed window would admit 2x the rate in a short span across
        // the window edge; the bucket caps any 1-second span at capacity
        // plus the refill earned inside it.
        let mut bucket = TokenBucket::new(10);
        let mut admitted = 0;
        for step in 0..40u64 {
            // Four commands every 50 ms, straddling t = 1 s.
            for _ in 0..4 {
                if bucket.allow(at(900 + step * 50), 10) {
                    admitted += 1;
                }
            }
        }
        // 2 s of wall time: one full burst plus ~19 refilled tokens.
        assert!(admitted <= 30, "admitted {admitted}");
    }

    #[test]
    fn bucket_caps_refill_at_capacity() {
        let mut bucket = TokenBucket::new(5);
        bucket.allow(at(0), 5);
        // A long idle gap must not bank more than one second of burst.
        for _ in 0..5 {
            assert!(bucket.allow(at(60_000), 5));
        }
        assert!(!bucket.allow(at(60_000), 5));
    }
}
