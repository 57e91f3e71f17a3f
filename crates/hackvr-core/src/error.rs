//! Error types for the session core.
//!
//! The protocol has two regimes. Establishment is strict: every error here
//! closes the transport, is surfaced to the user, and must not trigger an
//! automatic retry. After establishment the stream is optimistic: errors
//! drop a single command and the connection continues; those are modeled
//! as per-command drop reasons by the drivers, not as `Err` returns that
//! tear anything down.

use hackvr_proto::{CommandError, FramingViolation, Version};
use thiserror::Error;

/// Fatal establishment failures. Each closes the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstablishError {
    /// A framing violation before establishment completed.
    #[error("framing violation during establishment: {0}")]
    Framing(#[from] FramingViolation),

    /// The first line was not a well-formed command.
    #[error("malformed first command: {0}")]
    Command(#[from] CommandError),

    /// The first command was not `hackvr-hello`.
    #[error("expected hackvr-hello, got {got:?}")]
    ExpectedHello {
        /// Name of the command that arrived instead.
        got: String,
    },

    /// The client hello is missing its target URI.
    #[error("client hello is missing the target uri")]
    MissingUri,

    /// A `hackvr-hello` arrived with fields its direction does not allow,
    /// or appeared where it must not (on an upgraded stream, or twice).
    #[error("malformed hello: {reason}")]
    BadHello {
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The hello URI carried a fragment; fragments never travel on the wire.
    #[error("hello uri must not contain a fragment")]
    FragmentInUri,

    /// The negotiated version is unsupported.
    #[error("no common protocol version (peer offered {offered})")]
    VersionMismatch {
        /// Version the peer offered.
        offered: Version,
    },

    /// The HTTP upgrade preface was malformed.
    #[error("malformed HTTP upgrade preface: {reason}")]
    MalformedUpgrade {
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The HTTP response status was not `101 Switching Protocols`.
    ///
    /// For a non-101 2xx the body is carried so the viewer can surface it
    /// as debug text before closing.
    #[error("upgrade refused with HTTP status {status}")]
    UpgradeRefused {
        /// The response status code.
        status: u16,
        /// Response body for 2xx statuses, already decoded as lossy UTF-8.
        debug_body: Option<String>,
    },

    /// Upgrade response was 101 but the `Upgrade`/`Connection` headers did
    /// not confirm the switch.
    #[error("101 response without matching upgrade headers")]
    UpgradeHeadersMismatch,

    /// The URL scheme is not a HackVR scheme.
    #[error("unsupported url scheme {scheme:?}")]
    UnsupportedScheme {
        /// The offending scheme.
        scheme: String,
    },

    /// The peer closed the transport before establishment completed.
    #[error("transport closed during establishment")]
    TransportClosed,
}

/// Failures inside the auth state machine.
///
/// Post-establishment these translate to dropping the offending command (or
/// to a `reject-user`, which is a protocol outcome rather than an error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A command arrived that the current state does not admit.
    #[error("auth command {command:?} is invalid in state {state:?}")]
    InvalidState {
        /// Machine state at the time.
        state: &'static str,
        /// The offending command name.
        command: &'static str,
    },
}

/// Why a session resume was not honored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Token recognized and origin-valid; the carried user identity.
    Resumed {
        /// User the session belonged to.
        user: hackvr_proto::UserId,
    },
    /// Token recognized but the server requires re-authentication.
    ReauthRequired,
    /// Token unknown, expired, revoked, or bound to a different origin.
    ///
    /// Collapsed into one variant on purpose: resume rejection must not
    /// disclose which check failed.
    Rejected,
}
