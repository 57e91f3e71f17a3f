//! Viewer events and actions.
//!
//! The caller (renderer + transport glue) feeds events in and executes the
//! returned actions. The viewer machine itself never does IO: `Send` means
//! "encode this and write it", `FetchAsset` means "go download this
//! out-of-band", `ConfirmNavigation` means "ask the user, showing the full
//! URL including scheme".

use glam::{Quat, Vec3};
use hackvr_proto::{AssetRef, Command, Ident, Tag, TapKind, UserId};
use url::Url;

use crate::assets::AssetKind;

/// What the user's pick ray actually hit.
#[derive(Debug, Clone, PartialEq)]
pub enum PickTarget {
    /// A soup triangle, with its authored tag (possibly empty).
    Triangle {
        /// The triangle's tag; untagged triangles never produce taps.
        tag: Option<Tag>,
    },
    /// A sprite rectangle at normalized coordinates.
    Sprite {
        /// Left→right position in `[0, 1]`.
        u: f32,
        /// Top→bottom position in `[0, 1]`.
        v: f32,
    },
}

/// Events the caller feeds into the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent<I> {
    /// A framed line arrived from the server.
    Line {
        /// Terminator-stripped frame text.
        frame: String,
        /// Receipt time; transitions are authored against it.
        now: I,
    },
    /// The framer reported a recoverable violation.
    FrameViolation,
    /// The user picked an object.
    Pick {
        /// Picked object.
        object: Ident,
        /// Pointer action.
        kind: TapKind,
        /// What was hit.
        target: PickTarget,
    },
    /// The user sent text at a `textinput` object.
    Tell {
        /// Addressed object.
        object: Ident,
        /// The text.
        text: String,
    },
    /// The user typed a chat message.
    Chat {
        /// Message body.
        text: String,
    },
    /// The user activated an intent affordance.
    InvokeIntent {
        /// The intent.
        intent: Ident,
    },
    /// The user submitted the text-input draft.
    SubmitInput {
        /// Submitted text.
        text: String,
    },
    /// The user clicked while in raycast mode.
    FireRay {
        /// Ray origin in world coordinates.
        origin: Vec3,
        /// Ray direction; need not be unit length.
        direction: Vec3,
    },
    /// Free-look input from the windowing layer.
    FreeLook {
        /// New free-look rotation.
        rotation: Quat,
    },
    /// An out-of-band asset fetch finished.
    AssetFetched {
        /// The asset.
        asset: AssetRef,
        /// Bytes, or `None` on fetch failure. Hash checking happens inside.
        bytes: Option<Vec<u8>>,
    },
    /// The transport closed.
    TransportClosed,
}

/// User-visible notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Incoming chat line.
    Chat(String),
    /// The server asked for identity or input; show the prompt.
    Prompt(Option<String>),
    /// Identity accepted.
    UserAccepted(UserId),
    /// Identity rejected; the reason is surfaced verbatim.
    UserRejected {
        /// Rejected identity.
        user: UserId,
        /// Server-provided reason.
        reason: Option<String>,
    },
    /// The connection is gone; the last scene stays on screen and the
    /// viewer never reconnects on its own.
    Disconnected,
}

/// Actions for the driver to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerAction {
    /// Encode and send a command.
    Send(Command),
    /// Start an out-of-band asset fetch.
    FetchAsset {
        /// What to fetch.
        asset: AssetRef,
        /// Image or font, for placeholder selection.
        kind: AssetKind,
    },
    /// Show a notice to the user.
    Notify(Notice),
    /// Ask before navigating; the dialog must show the full URL.
    ConfirmNavigation {
        /// Navigation target.
        url: Url,
    },
}
