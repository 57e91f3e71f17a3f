//! Authentication state machine.
//!
//! The server drives `request-user` → `set-user` → `request-authentication`
//! → `authenticate` → `accept-user`/`reject-user`. No passwords exist
//! anywhere: the viewer proves identity by signing
//! `hackvr-auth-v1:<user>:<nonce>` (nonce as lowercase hex) with the Ed25519
//! key registered for that user.
//!
//! ```text
//! ┌──────┐ request-user ┌──────────────┐ set-user ┌───────────────────┐
//! │ Idle │─────────────>│ AwaitSetUser │─────────>│ AwaitAuthenticate │
//! └──────┘              └──────────────┘          └───────────────────┘
//!     ^                                                    │
//!     └────────────── accept-user / reject-user ───────────┘
//! ```
//!
//! `set-user $anonymous` short-circuits from any state: it is always
//! accepted without a challenge. Illegal transitions are command errors
//! (the command is dropped); the machine itself never closes a connection.
//!
//! The machine holds no clock and no RNG: callers pass `now` and fresh
//! nonce bytes in, so the whole cycle is testable without an environment.

use std::time::Duration;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hackvr_proto::{Command, UserId, auth_signing_input};

/// How long a challenge nonce stays valid.
pub const NONCE_TTL: Duration = Duration::from_secs(60);

/// How long consumed nonces are remembered for reuse detection.
pub const NONCE_REUSE_WINDOW: Duration = Duration::from_secs(300);

/// The uniform rejection reason.
///
/// When authentication is enabled the reason must not disclose whether the
/// username or the signature failed.
pub const REJECTED: &str = "rejected";

/// Auth timing configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Challenge nonce lifetime.
    pub nonce_ttl: Duration,
    /// Anti-reuse memory for consumed nonces.
    pub reuse_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { nonce_ttl: NONCE_TTL, reuse_window: NONCE_REUSE_WINDOW }
    }
}

/// Lookup of registered Ed25519 keys.
///
/// Entries are read-mostly; implementations may serve slightly stale data.
pub trait IdentityLookup {
    /// The verifying key for `user`, if registered.
    fn verifying_key(&self, user: &UserId) -> Option<VerifyingKey>;
}

impl<T: IdentityLookup> IdentityLookup for std::sync::Arc<T> {
    fn verifying_key(&self, user: &UserId) -> Option<VerifyingKey> {
        (**self).verifying_key(user)
    }
}

/// Server-side auth machine state.
#[derive(Debug, Clone)]
enum State<I> {
    Idle,
    AwaitSetUser,
    AwaitAuthenticate { user: UserId, nonce: [u8; 16], issued_at: I },
}

impl<I> State<I> {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitSetUser => "AwaitSetUser",
            Self::AwaitAuthenticate { .. } => "AwaitAuthenticate",
        }
    }
}

/// Server half of the authentication cycle for one connection.
#[derive(Debug, Clone)]
pub struct ServerAuth<I> {
    state: State<I>,
    effective: UserId,
    /// Consumed nonces with consumption time, pruned to the reuse window.
    recent: Vec<([u8; 16], I)>,
    config: AuthConfig,
}

impl<I> ServerAuth<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// New machine; the effective user starts as `$anonymous`.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { state: State::Idle, effective: UserId::anonymous(), recent: Vec::new(), config }
    }

    /// The connection's current effective identity.
    #[must_use]
    pub fn effective_user(&self) -> &UserId {
        &self.effective
    }

    /// Machine state name, for logging.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Host-initiated: open the cycle with `request-user`.
    ///
    /// Only valid from `Idle`; the returned command must be sent to the
    /// viewer. Returns `None` when a cycle is already in flight.
    pub fn begin(&mut self, prompt: Option<String>) -> Option<Command> {
        match self.state {
            State::Idle => {
                self.state = State::AwaitSetUser;
                Some(Command::RequestUser { prompt })
            }
            _ => None,
        }
    }

    /// Viewer sent `set-user`.
    ///
    /// `fresh_nonce` is consumed only when a challenge is actually issued.
    /// Returns the reply to send, or `None` when the command is dropped
    /// (illegal state).
    pub fn on_set_user(&mut self, user: UserId, fresh_nonce: [u8; 16], now: I) -> Option<Command> {
        if user.is_anonymous() {
            // Always accepted, from any state, with no challenge.
            self.state = State::Idle;
            self.effective = UserId::anonymous();
            return Some(Command::AcceptUser { user: UserId::anonymous() });
        }
        match self.state {
            State::AwaitSetUser => {
                let challenge = Command::RequestAuthentication { user: user.clone(), nonce: fresh_nonce };
                self.state = State::AwaitAuthenticate { user, nonce: fresh_nonce, issued_at: now };
                Some(challenge)
            }
            _ => None,
        }
    }

    /// Viewer sent `authenticate`.
    ///
    /// The pending nonce is consumed no matter the outcome. Returns
    /// `accept-user` or `reject-user` to send, or `None` when the command
    /// is dropped (no challenge in flight).
    pub fn on_authenticate(
        &mut self,
        user: &UserId,
        signature: &[u8; 64],
        now: I,
        keys: &impl IdentityLookup,
    ) -> Option<Command> {
        let State::AwaitAuthenticate { user: challenged, nonce, issued_at } =
            std::mem::replace(&mut self.state, State::Idle)
        else {
            return None;
        };

        self.prune_recent(now);
        let reused = self.recent.iter().any(|(n, _)| *n == nonce);
        self.recent.push((nonce, now));

        let fresh = !reused && now - issued_at <= self.config.nonce_ttl;
        let verified = fresh && *user == challenged && verify(keys, user, &nonce, signature);

        if verified {
            self.effective = user.clone();
            Some(Command::AcceptUser { user: user.clone() })
        } else {
            self.effective = UserId::anonymous();
            Some(Command::RejectUser { user: user.clone(), reason: Some(REJECTED.to_owned()) })
        }
    }

    /// Restore an identity without a challenge, for session resumption
    /// under a token-trusting resume policy. Cancels any pending cycle.
    pub fn restore(&mut self, user: UserId) {
        self.state = State::Idle;
        self.effective = user;
    }

    /// Expire a pending challenge that outlived its TTL. Drivers call this
    /// from their tick; expiry emits nothing on the wire.
    pub fn tick(&mut self, now: I) {
        if let State::AwaitAuthenticate { issued_at, .. } = &self.state {
            if now - *issued_at > self.config.nonce_ttl {
                self.state = State::Idle;
            }
        }
        self.prune_recent(now);
    }

    fn prune_recent(&mut self, now: I) {
        let window = self.config.reuse_window;
        self.recent.retain(|(_, at)| now - *at <= window);
    }
}

fn verify(
    keys: &impl IdentityLookup,
    user: &UserId,
    nonce: &[u8; 16],
    signature: &[u8; 64],
) -> bool {
    let Some(key) = keys.verifying_key(user) else {
        return false;
    };
    let message = auth_signing_input(user, nonce);
    key.verify_strict(&message, &Signature::from_bytes(signature)).is_ok()
}

/// Viewer half: answers challenges for one identity.
#[derive(Debug)]
pub struct ClientAuthenticator {
    user: UserId,
    key: SigningKey,
}

impl ClientAuthenticator {
    /// Authenticator for `user` holding its signing key.
    #[must_use]
    pub fn new(user: UserId, key: SigningKey) -> Self {
        Self { user, key }
    }

    /// The identity this authenticator answers for.
    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The `set-user` command opening the cycle.
    #[must_use]
    pub fn set_user(&self) -> Command {
        Command::SetUser { user: self.user.clone() }
    }

    /// Answer a challenge. Returns `None` when the challenge names someone
    /// else; signing for a foreign user would be an oracle.
    #[must_use]
    pub fn answer(&self, challenged: &UserId, nonce: &[u8; 16]) -> Option<Command> {
        if *challenged != self.user {
            return None;
        }
        let signature = self.key.sign(&auth_signing_input(&self.user, nonce));
        Some(Command::Authenticate {
            user: self.user.clone(),
            signature: Box::new(signature.to_bytes()),
        })
    }
}
