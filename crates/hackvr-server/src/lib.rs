//! HackVR production server.
//!
//! Thin runtime glue around the sans-IO protocol stack: the
//! [`ServerDriver`] owns all protocol state and produces actions; the
//! tokio [`Server`] executes them over TCP. World applications talk to a
//! running server through a [`ServerHandle`] (authoring commands in) and
//! an [`HostEvent`] channel (viewer interactions out).
//!
//! # Components
//!
//! - [`ServerDriver`]: per-connection establishment, auth, sessions,
//!   gating, and the authoritative scene copies (pure logic, no IO)
//! - [`Server`]: TCP accept loop and action executor
//! - [`IdentityStore`]: the `userid → Ed25519 key` table
//! - [`SystemEnv`]: real clock + OS CSPRNG

pub mod driver;
pub mod error;
pub mod identity;
pub mod system_env;
pub mod transport;

pub use driver::{
    ConnId, HostEvent, ServerAction, ServerConfig, ServerDriver, ServerEvent, TransportKind,
};
pub use error::ServerError;
pub use identity::{IdentityError, IdentityStore};
pub use system_env::SystemEnv;
pub use transport::{HostCommand, Server, ServerHandle};
