//! HackVR wire codec.
//!
//! The protocol is line-oriented UTF-8 text: one command per CRLF-terminated
//! frame, HT-separated typed arguments, no escaping (LF may appear inside a
//! parameter to carry a literal newline; HT and CR cannot be carried).
//!
//! This crate owns everything between raw bytes and a typed [`Command`]:
//!
//! - [`Framer`]: incremental CRLF splitter with resynchronization
//! - argument types: floats/vectors ([`args`]), [`Color`], identifiers
//!   ([`Ident`], [`Tag`], [`UserId`]), [`SessionToken`], wire enums
//! - [`Selector`]: globbing and range expansion over dash-grouped ids
//! - [`Command`]: the catalog, with direction metadata and canonical
//!   encoding
//!
//! It deliberately owns no state: session, scene, and interaction semantics
//! live in the crates layered above.

pub mod args;
pub mod command;
pub mod enums;
pub mod error;
pub mod framer;
pub mod ident;
pub mod selector;
pub mod token;

pub use args::Color;
pub use command::{AssetRef, Command, Direction, ListedTriangle, Sender};
pub use enums::{Anchor, ReparentMode, SizeMode, TapKind, TrackMode, Version};
pub use error::{ArgError, CommandError, FramingViolation};
pub use framer::{Framer, FramerConfig, FramerEvent, MAX_FRAME_SIZE};
pub use ident::{ANONYMOUS, CAMERA, GLOBAL, Ident, Tag, UserId};
pub use selector::{DEFAULT_CREATE_EXPANSION_CAP, Selector};
pub use token::SessionToken;

/// The Ed25519 signing-input prefix for `authenticate`.
///
/// The full signing input is `hackvr-auth-v1:<user>:<nonce>` with the nonce
/// rendered as lowercase hex regardless of how it was spelled on the wire.
pub const AUTH_CONTEXT: &str = "hackvr-auth-v1";

/// Build the byte string an `authenticate` signature covers.
#[must_use]
pub fn auth_signing_input(user: &UserId, nonce: &[u8; 16]) -> Vec<u8> {
    format!("{AUTH_CONTEXT}:{}:{}", user.as_str(), args::format_bytes(nonce)).into_bytes()
}
