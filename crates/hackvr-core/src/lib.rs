//! HackVR session core.
//!
//! Everything between a framed byte stream and a live scene: establishment
//! (raw `hackvr-hello` and HTTP/1.1 Upgrade), the authentication state
//! machine, and the session-token engine with origin binding.
//!
//! The machines here are sans-IO: they consume frames and instants, and
//! return commands for a driver to put on the wire. Time and randomness
//! enter only through [`env::Environment`], so every state machine runs
//! under a virtual clock in tests.
//!
//! # Error regimes
//!
//! Establishment is strict: any [`error::EstablishError`] closes the
//! transport and is surfaced to the user, never auto-retried. After
//! establishment the stream is optimistic: machines signal "drop this one
//! command" by returning `None`, and the connection lives on.

pub mod auth;
pub mod env;
pub mod error;
pub mod establish;
pub mod origin;
pub mod session;

pub use auth::{AuthConfig, ClientAuthenticator, IdentityLookup, NONCE_TTL, ServerAuth};
pub use env::Environment;
pub use error::{AuthError, EstablishError, ResumeOutcome};
pub use establish::{
    Established, PrefaceBuffer, RawClient, RawServer, SUPPORTED_VERSION, UpgradeRequest,
    build_upgrade_request, build_upgrade_response, check_upgrade_response, parse_upgrade_request,
};
pub use origin::{Origin, Scheme};
pub use session::{AnnouncedToken, ResumePolicy, SessionRegistry};
