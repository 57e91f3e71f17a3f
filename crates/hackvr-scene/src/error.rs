//! Scene-level command outcomes.
//!
//! Post-establishment the scene never fails hard: every server command
//! either applies, is a no-op (empty selection, missing weak reference), or
//! is dropped with a reason the driver can log. Selector-expanded commands
//! are atomic: a drop means nothing in the batch applied.

use hackvr_proto::CommandError;
use thiserror::Error;

/// Why a scene command was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Creating or destroying a predefined entity (`$global`, `$camera`).
    #[error("forbidden identifier")]
    ForbiddenIdentifier,

    /// A create named an entity that already exists.
    #[error("duplicate create")]
    DuplicateCreate,

    /// A directly referenced entity does not exist.
    #[error("missing entity")]
    MissingEntity,

    /// The command requires a different geometry variant.
    #[error("geometry variant mismatch")]
    VariantMismatch,

    /// The reparent would make an object its own ancestor, or move
    /// `$global`.
    #[error("reparent rejected")]
    ReparentRejected,

    /// An object would track itself or one of its descendants.
    #[error("tracking target is self or a descendant")]
    TrackTargetInvalid,

    /// A resource limit (objects, triangles, nesting depth) was exceeded.
    #[error("resource limit exceeded")]
    LimitExceeded,

    /// The selector was invalid for this position or over-expanded.
    #[error("selector rejected: {0}")]
    Selector(#[from] CommandError),

    /// A property value failed to parse for its key.
    #[error("bad property value")]
    BadPropertyValue,

    /// The command is not a scene command; another subsystem owns it.
    #[error("not a scene command")]
    NotSceneCommand,
}

/// Result of applying one command to the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// State changed.
    Applied,
    /// Legal command, nothing to do (empty selection or missing weak
    /// reference).
    NoOp,
    /// Dropped; no part of the command applied.
    Dropped(DropReason),
}

impl Outcome {
    /// Whether the command was not dropped.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Dropped(_))
    }
}
