//! Server runtime errors.
//!
//! These are transport-layer failures only. Protocol-level problems never
//! surface here: establishment violations close one connection, and
//! post-establishment command errors are dropped per command.

use thiserror::Error;

use crate::identity::IdentityError;

/// Fatal server runtime errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("cannot bind {address}: {source}")]
    Bind {
        /// Requested address.
        address: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Listener-level IO failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The identity file failed to load.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}
