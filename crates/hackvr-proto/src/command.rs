//! Command catalog and schema-driven dispatch.
//!
//! One enum variant per wire command, the same exhaustive-match discipline as
//! a binary opcode table: adding a variant breaks `parse`, `encode`, `name`,
//! and `direction` until every site handles it, so no command can be half
//! wired.
//!
//! Parsing order for a frame: name lookup → direction check → optional
//! mapping → typed parse. Selector positions parse to [`Selector`];
//! expansion happens later in the scene layer so the whole batch can be
//! applied atomically.
//!
//! Optional-parameter mapping: an omitted parameter is absent; a
//! present-but-empty parameter is the empty string only for `zstring`
//! positions and absent for every other type.

use glam::Vec3;
use url::Url;

use crate::{
    args::{self, Color},
    enums::{Anchor, ReparentMode, SizeMode, TapKind, TrackMode, Version},
    error::{ArgError, CommandError},
    framer::MAX_FRAME_SIZE,
    ident::{Ident, Tag, UserId},
    selector::Selector,
    token::SessionToken,
};

/// Who may emit a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client.
    ToClient,
    /// Client to server.
    ToServer,
    /// Valid in both directions.
    Either,
}

/// Which side produced a line, for direction enforcement at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// The line came from the server.
    Server,
    /// The line came from the viewer.
    Client,
}

impl Direction {
    /// Whether a line from `sender` is direction-correct.
    #[must_use]
    pub fn accepts(self, sender: Sender) -> bool {
        match self {
            Self::ToClient => sender == Sender::Server,
            Self::ToServer => sender == Sender::Client,
            Self::Either => true,
        }
    }
}

/// An image or font asset reference: location plus content address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    /// Absolute URI of the asset.
    pub uri: Url,
    /// SHA-256 of the asset bytes.
    pub sha256: [u8; 32],
}

/// One triangle of an `add-triangle-list` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListedTriangle {
    /// Face color.
    pub color: Color,
    /// Vertices in winding order.
    pub vertices: [Vec3; 3],
}

/// A parsed protocol command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Establishment hello. The client form carries a target URI and an
    /// optional session token; the server form only the version.
    Hello {
        /// Highest protocol version the sender speaks.
        max_version: Version,
        /// Client only: the URI being connected to, without fragment.
        uri: Option<Url>,
        /// Client only: session token to resume.
        session: Option<SessionToken>,
    },
    /// Free-form text message, either direction.
    Chat {
        /// Message body; may contain literal newlines.
        message: String,
    },

    // Auth
    /// Server asks the viewer to identify.
    RequestUser {
        /// Prompt shown to the user.
        prompt: Option<String>,
    },
    /// Viewer names its identity.
    SetUser {
        /// Requested identity.
        user: UserId,
    },
    /// Server challenges the named user.
    RequestAuthentication {
        /// User being challenged.
        user: UserId,
        /// Single-use random nonce.
        nonce: [u8; 16],
    },
    /// Viewer answers a challenge.
    Authenticate {
        /// User answering.
        user: UserId,
        /// Ed25519 signature over the auth signing input.
        signature: Box<[u8; 64]>,
    },
    /// Server accepts the identity.
    AcceptUser {
        /// Accepted identity.
        user: UserId,
    },
    /// Server rejects the identity; the effective user returns to
    /// `$anonymous`.
    RejectUser {
        /// Rejected identity.
        user: UserId,
        /// Reason surfaced verbatim to the user.
        reason: Option<String>,
    },

    // Sessions
    /// Server associates a token with this connection.
    AnnounceSession {
        /// The token.
        token: SessionToken,
    },
    /// Server declares a token invalid everywhere.
    RevokeSession {
        /// The token.
        token: SessionToken,
    },
    /// Viewer asks to restore a previous session.
    ResumeSession {
        /// The token.
        token: SessionToken,
    },

    // Scene objects
    /// Create objects. Selector may use expansion forms only.
    CreateObject {
        /// New object ids.
        object: Selector,
        /// Parent, `$global` when absent.
        parent: Option<Ident>,
    },
    /// Destroy objects; children reparent to `$global` keeping their world
    /// transform.
    DestroyObject {
        /// Doomed objects.
        object: Selector,
    },
    /// Move objects to a new parent.
    ReparentObject {
        /// Objects to move.
        object: Selector,
        /// New parent.
        parent: Ident,
        /// Whether the world or local transform is preserved.
        mode: ReparentMode,
    },
    /// Start transitions on any subset of the pos/rot/scale channels.
    SetObjectTransform {
        /// Target objects.
        object: Selector,
        /// Target local position.
        pos: Option<Vec3>,
        /// Target local rotation, Euler pan/tilt/roll degrees.
        rot: Option<Vec3>,
        /// Target local scale.
        scale: Option<Vec3>,
        /// Transition duration in seconds; 0 is instantaneous.
        duration: f32,
    },
    /// Aim objects at a target, or clear tracking when `target` is absent.
    TrackObject {
        /// Tracking objects.
        object: Selector,
        /// Target object; absent clears tracking.
        target: Option<Ident>,
        /// Aim mode.
        mode: TrackMode,
        /// Smoothing duration for the reconfiguration.
        duration: f32,
    },
    /// Set `clickable`, `textinput`, or `href`.
    SetObjectProperty {
        /// Target objects.
        object: Selector,
        /// Property key.
        key: Ident,
        /// Property value; empty clears `href`.
        value: String,
    },
    /// Attach a geometry to objects, or detach when absent.
    AttachGeometry {
        /// Target objects.
        object: Selector,
        /// Geometry to attach.
        geometry: Option<Ident>,
    },

    // Geometry
    /// Create triangle-soup geometries.
    CreateGeometry {
        /// New geometry ids.
        geometry: Selector,
    },
    /// Create image sprites.
    CreateSprite {
        /// New geometry ids.
        geometry: Selector,
        /// Rectangle width.
        width: f32,
        /// Rectangle height.
        height: f32,
        /// Origin convention.
        anchor: Anchor,
        /// Image fit.
        size_mode: SizeMode,
        /// Image asset.
        image: AssetRef,
    },
    /// Create text sprites.
    CreateText {
        /// New geometry ids.
        geometry: Selector,
        /// Rectangle width.
        width: f32,
        /// Rectangle height.
        height: f32,
        /// Origin convention.
        anchor: Anchor,
        /// Glyph fit.
        size_mode: SizeMode,
        /// Font asset.
        font: AssetRef,
        /// Initial text.
        text: String,
    },
    /// Replace the text of text sprites.
    SetText {
        /// Target geometries.
        geometry: Selector,
        /// New text.
        text: String,
    },
    /// Set the foreground color of text sprites.
    SetTextColor {
        /// Target geometries.
        geometry: Selector,
        /// Foreground color.
        color: Color,
    },
    /// Set or clear the background color of text sprites.
    SetTextBackground {
        /// Target geometries.
        geometry: Selector,
        /// Background; absent means transparent.
        background: Option<Color>,
    },
    /// Destroy geometries.
    DestroyGeometry {
        /// Doomed geometries.
        geometry: Selector,
    },
    /// Append individually colored triangles sharing one tag.
    AddTriangleList {
        /// Target geometry.
        geometry: Ident,
        /// Shared tag; absent triangles are unreferenceable.
        tag: Option<Tag>,
        /// The triangles.
        triangles: Vec<ListedTriangle>,
    },
    /// Append a triangle strip in one color.
    AddTriangleStrip {
        /// Target geometry.
        geometry: Ident,
        /// Shared tag.
        tag: Option<Tag>,
        /// Strip color.
        color: Color,
        /// At least three vertices.
        vertices: Vec<Vec3>,
    },
    /// Append a triangle fan in one color.
    AddTriangleFan {
        /// Target geometry.
        geometry: Ident,
        /// Shared tag.
        tag: Option<Tag>,
        /// Fan color.
        color: Color,
        /// At least three vertices.
        vertices: Vec<Vec3>,
    },
    /// Remove tagged triangles. Untagged triangles never match.
    RemoveTriangles {
        /// Target geometries.
        geometry: Selector,
        /// Tags to remove.
        tag: Selector,
    },

    // Intents
    /// Declare or relabel an intent (upsert).
    CreateIntent {
        /// Intent id.
        intent: Ident,
        /// Human-readable label.
        label: String,
    },
    /// Remove intents, predefined ones included.
    DestroyIntent {
        /// Doomed intents.
        intent: Selector,
    },
    /// Viewer invokes an intent.
    Intent {
        /// Invoked intent.
        intent: Ident,
    },

    // Interaction
    /// Viewer tapped a clickable object on a tagged triangle.
    TapObject {
        /// Picked object.
        object: Ident,
        /// Pointer action.
        kind: TapKind,
        /// Tag of the picked triangle.
        tag: Tag,
    },
    /// Viewer sent text to a `textinput` object.
    TellObject {
        /// Addressed object.
        object: Ident,
        /// The text.
        text: String,
    },
    /// Server opens text-input mode.
    RequestInput {
        /// Prompt shown next to the input field.
        prompt: Option<String>,
    },
    /// Server closes text-input mode.
    CancelInput,
    /// Viewer submits the text-input draft (closes the mode).
    SendInput {
        /// Submitted text.
        text: String,
    },
    /// Server opens raycast mode (idempotent).
    RaycastRequest,
    /// Either side closes raycast mode.
    RaycastCancel,
    /// Viewer reports a ray in world coordinates (closes the mode).
    Raycast {
        /// Ray origin.
        origin: Vec3,
        /// Ray direction; any nonzero length.
        direction: Vec3,
    },
    /// Server enables or disables viewer free-look.
    EnableFreeLook {
        /// New free-look state; disabling resets the free-look rotation.
        enabled: bool,
    },
}

impl Command {
    /// The wire name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hackvr-hello",
            Self::Chat { .. } => "chat",
            Self::RequestUser { .. } => "request-user",
            Self::SetUser { .. } => "set-user",
            Self::RequestAuthentication { .. } => "request-authentication",
            Self::Authenticate { .. } => "authenticate",
            Self::AcceptUser { .. } => "accept-user",
            Self::RejectUser { .. } => "reject-user",
            Self::AnnounceSession { .. } => "announce-session",
            Self::RevokeSession { .. } => "revoke-session",
            Self::ResumeSession { .. } => "resume-session",
            Self::CreateObject { .. } => "create-object",
            Self::DestroyObject { .. } => "destroy-object",
            Self::ReparentObject { .. } => "reparent-object",
            Self::SetObjectTransform { .. } => "set-object-transform",
            Self::TrackObject { .. } => "track-object",
            Self::SetObjectProperty { .. } => "set-object-property",
            Self::AttachGeometry { .. } => "attach-geometry",
            Self::CreateGeometry { .. } => "create-geometry",
            Self::CreateSprite { .. } => "create-sprite",
            Self::CreateText { .. } => "create-text",
            Self::SetText { .. } => "set-text",
            Self::SetTextColor { .. } => "set-text-color",
            Self::SetTextBackground { .. } => "set-text-background",
            Self::DestroyGeometry { .. } => "destroy-geometry",
            Self::AddTriangleList { .. } => "add-triangle-list",
            Self::AddTriangleStrip { .. } => "add-triangle-strip",
            Self::AddTriangleFan { .. } => "add-triangle-fan",
            Self::RemoveTriangles { .. } => "remove-triangles",
            Self::CreateIntent { .. } => "create-intent",
            Self::DestroyIntent { .. } => "destroy-intent",
            Self::Intent { .. } => "intent",
            Self::TapObject { .. } => "tap-object",
            Self::TellObject { .. } => "tell-object",
            Self::RequestInput { .. } => "request-input",
            Self::CancelInput => "cancel-input",
            Self::SendInput { .. } => "send-input",
            Self::RaycastRequest => "raycast-request",
            Self::RaycastCancel => "raycast-cancel",
            Self::Raycast { .. } => "raycast",
            Self::EnableFreeLook { .. } => "enable-free-look",
        }
    }

    /// Who may emit this command.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::Hello { .. } | Self::Chat { .. } | Self::RaycastCancel => Direction::Either,

            Self::SetUser { .. }
            | Self::Authenticate { .. }
            | Self::ResumeSession { .. }
            | Self::Intent { .. }
            | Self::TapObject { .. }
            | Self::TellObject { .. }
            | Self::SendInput { .. }
            | Self::Raycast { .. } => Direction::ToServer,

            _ => Direction::ToClient,
        }
    }

    /// Parse one terminator-stripped frame.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`]; the caller decides whether it is fatal
    /// (establishment) or drops the single command (steady state).
    pub fn parse(frame: &str, sender: Sender) -> Result<Self, CommandError> {
        let mut fields = frame.split('\t');
        let name = fields.next().unwrap_or_default();
        let raw_args: Vec<&str> = fields.collect();

        let command = Self::parse_args(name, &raw_args)?;
        if !command.direction().accepts(sender) {
            return Err(CommandError::WrongDirection { name: command.name() });
        }
        Ok(command)
    }

    fn parse_args(name: &str, raw: &[&str]) -> Result<Self, CommandError> {
        let mut a = Args::new(name, raw);
        let command = match name {
            "hackvr-hello" => Self::Hello {
                max_version: a.req("version", Version::parse)?,
                uri: a.opt("uri", parse_uri)?,
                session: a.opt("session-token", SessionToken::parse)?,
            },
            "chat" => Self::Chat { message: a.req_string("message")? },
            "request-user" => Self::RequestUser { prompt: a.opt_zstring() },
            "set-user" => Self::SetUser { user: a.req("userid", parse_userid)? },
            "request-authentication" => Self::RequestAuthentication {
                user: a.req("userid", parse_userid)?,
                nonce: a.req("bytes[16]", args::parse_bytes::<16>)?,
            },
            "authenticate" => Self::Authenticate {
                user: a.req("userid", parse_userid)?,
                signature: Box::new(a.req("bytes[64]", args::parse_bytes::<64>)?),
            },
            "accept-user" => Self::AcceptUser { user: a.req("userid", parse_userid)? },
            "reject-user" => Self::RejectUser {
                user: a.req("userid", parse_userid)?,
                reason: a.opt_string(),
            },
            "announce-session" => {
                Self::AnnounceSession { token: a.req("session-token", SessionToken::parse)? }
            }
            "revoke-session" => {
                Self::RevokeSession { token: a.req("session-token", SessionToken::parse)? }
            }
            "resume-session" => {
                Self::ResumeSession { token: a.req("session-token", SessionToken::parse)? }
            }
            "create-object" => Self::CreateObject {
                object: a.req("selector", Selector::parse)?,
                parent: a.opt("identifier", parse_ident)?,
            },
            "destroy-object" => {
                Self::DestroyObject { object: a.req("selector", Selector::parse)? }
            }
            "reparent-object" => Self::ReparentObject {
                object: a.req("selector", Selector::parse)?,
                parent: a.req("identifier", parse_ident)?,
                mode: a.req("reparent-mode", ReparentMode::parse)?,
            },
            "set-object-transform" => Self::SetObjectTransform {
                object: a.req("selector", Selector::parse)?,
                pos: a.opt("vec3", args::parse_vec3)?,
                rot: a.opt("vec3", args::parse_vec3)?,
                scale: a.opt("vec3", args::parse_vec3)?,
                duration: a.opt("duration", parse_duration)?.unwrap_or(0.0),
            },
            "track-object" => Self::TrackObject {
                object: a.req("selector", Selector::parse)?,
                target: a.opt("identifier", parse_ident)?,
                mode: a.opt("track-mode", TrackMode::parse)?.unwrap_or(TrackMode::Focus),
                duration: a.opt("duration", parse_duration)?.unwrap_or(0.0),
            },
            "set-object-property" => Self::SetObjectProperty {
                object: a.req("selector", Selector::parse)?,
                key: a.req("identifier", parse_ident)?,
                value: a.req_zstring("value")?,
            },
            "attach-geometry" => Self::AttachGeometry {
                object: a.req("selector", Selector::parse)?,
                geometry: a.opt("identifier", parse_ident)?,
            },
            "create-geometry" => {
                Self::CreateGeometry { geometry: a.req("selector", Selector::parse)? }
            }
            "create-sprite" => Self::CreateSprite {
                geometry: a.req("selector", Selector::parse)?,
                width: a.req("float", args::parse_float)?,
                height: a.req("float", args::parse_float)?,
                anchor: a.req("anchor", Anchor::parse)?,
                size_mode: a.req("sizemode", SizeMode::parse)?,
                image: a.req_asset()?,
            },
            "create-text" => Self::CreateText {
                geometry: a.req("selector", Selector::parse)?,
                width: a.req("float", args::parse_float)?,
                height: a.req("float", args::parse_float)?,
                anchor: a.req("anchor", Anchor::parse)?,
                size_mode: a.req("sizemode", SizeMode::parse)?,
                font: a.req_asset()?,
                text: a.req_zstring("text")?,
            },
            "set-text" => Self::SetText {
                geometry: a.req("selector", Selector::parse)?,
                text: a.req_zstring("text")?,
            },
            "set-text-color" => Self::SetTextColor {
                geometry: a.req("selector", Selector::parse)?,
                color: a.req("color", Color::parse)?,
            },
            "set-text-background" => Self::SetTextBackground {
                geometry: a.req("selector", Selector::parse)?,
                background: a.opt("color", Color::parse)?,
            },
            "destroy-geometry" => {
                Self::DestroyGeometry { geometry: a.req("selector", Selector::parse)? }
            }
            "add-triangle-list" => {
                let geometry = a.req("identifier", parse_ident)?;
                let tag = a.req_tag()?;
                let mut triangles = Vec::new();
                loop {
                    let color = a.req("color", Color::parse)?;
                    let vertices = [
                        a.req("vec3", args::parse_vec3)?,
                        a.req("vec3", args::parse_vec3)?,
                        a.req("vec3", args::parse_vec3)?,
                    ];
                    triangles.push(ListedTriangle { color, vertices });
                    if a.at_end() {
                        break;
                    }
                }
                Self::AddTriangleList { geometry, tag, triangles }
            }
            "add-triangle-strip" | "add-triangle-fan" => {
                let geometry = a.req("identifier", parse_ident)?;
                let tag = a.req_tag()?;
                let color = a.req("color", Color::parse)?;
                let mut vertices = Vec::new();
                loop {
                    vertices.push(a.req("vec3", args::parse_vec3)?);
                    if a.at_end() {
                        break;
                    }
                }
                if vertices.len() < 3 {
                    return Err(CommandError::ArgCount {
                        name: if name == "add-triangle-strip" {
                            "add-triangle-strip"
                        } else {
                            "add-triangle-fan"
                        },
                        expected: "at least 3 vertices",
                        got: vertices.len(),
                    });
                }
                if name == "add-triangle-strip" {
                    Self::AddTriangleStrip { geometry, tag, color, vertices }
                } else {
                    Self::AddTriangleFan { geometry, tag, color, vertices }
                }
            }
            "remove-triangles" => Self::RemoveTriangles {
                geometry: a.req("selector", Selector::parse)?,
                tag: a.req("selector", Selector::parse)?,
            },
            "create-intent" => Self::CreateIntent {
                intent: a.req("identifier", parse_ident)?,
                label: a.req_string("label")?,
            },
            "destroy-intent" => {
                Self::DestroyIntent { intent: a.req("selector", Selector::parse)? }
            }
            "intent" => Self::Intent { intent: a.req("identifier", parse_ident)? },
            "tap-object" => Self::TapObject {
                object: a.req("identifier", parse_ident)?,
                kind: a.req("tapkind", TapKind::parse)?,
                tag: a.req("tag", |s| Tag::parse(s).ok())?,
            },
            "tell-object" => Self::TellObject {
                object: a.req("identifier", parse_ident)?,
                text: a.req_string("text")?,
            },
            "request-input" => Self::RequestInput { prompt: a.opt_zstring() },
            "cancel-input" => Self::CancelInput,
            "send-input" => Self::SendInput { text: a.req_zstring("text")? },
            "raycast-request" => Self::RaycastRequest,
            "raycast-cancel" => Self::RaycastCancel,
            "raycast" => Self::Raycast {
                origin: a.req("vec3", args::parse_vec3)?,
                direction: a.req("vec3", args::parse_vec3)?,
            },
            "enable-free-look" => {
                Self::EnableFreeLook { enabled: a.req("bool", args::parse_bool)? }
            }
            _ => return Err(CommandError::UnknownCommand { name: name.to_owned() }),
        };
        a.finish(command.name())?;
        Ok(command)
    }

    /// Encode to a terminator-less line in canonical form.
    ///
    /// # Errors
    ///
    /// [`CommandError::FrameTooLong`] if the line plus CRLF would exceed the
    /// frame size limit.
    pub fn encode(&self) -> Result<String, CommandError> {
        let mut line = LineBuilder::new(self.name());
        match self {
            Self::Hello { max_version, uri, session } => {
                line.arg(max_version.to_string());
                line.opt(uri.as_ref().map(ToString::to_string));
                line.opt(session.map(|t| t.to_string()));
            }
            Self::Chat { message } => line.arg(message.clone()),
            Self::RequestUser { prompt } => line.opt(prompt.clone()),
            Self::SetUser { user } => line.arg(user.to_string()),
            Self::RequestAuthentication { user, nonce } => {
                line.arg(user.to_string());
                line.arg(args::format_bytes(nonce));
            }
            Self::Authenticate { user, signature } => {
                line.arg(user.to_string());
                line.arg(args::format_bytes(signature.as_slice()));
            }
            Self::AcceptUser { user } => line.arg(user.to_string()),
            Self::RejectUser { user, reason } => {
                line.arg(user.to_string());
                line.opt(reason.clone());
            }
            Self::AnnounceSession { token }
            | Self::RevokeSession { token }
            | Self::ResumeSession { token } => line.arg(token.to_string()),
            Self::CreateObject { object, parent } => {
                line.arg(object.to_string());
                line.opt(parent.as_ref().map(ToString::to_string));
            }
            Self::DestroyObject { object } => line.arg(object.to_string()),
            Self::ReparentObject { object, parent, mode } => {
                line.arg(object.to_string());
                line.arg(parent.to_string());
                line.arg(mode.to_string());
            }
            Self::SetObjectTransform { object, pos, rot, scale, duration } => {
                line.arg(object.to_string());
                line.opt(pos.map(args::format_vec3));
                line.opt(rot.map(args::format_vec3));
                line.opt(scale.map(args::format_vec3));
                line.opt((*duration != 0.0).then(|| args::format_float(*duration)));
            }
            Self::TrackObject { object, target, mode, duration } => {
                line.arg(object.to_string());
                line.opt(target.as_ref().map(ToString::to_string));
                line.arg(mode.to_string());
                line.opt((*duration != 0.0).then(|| args::format_float(*duration)));
            }
            Self::SetObjectProperty { object, key, value } => {
                line.arg(object.to_string());
                line.arg(key.to_string());
                line.arg(value.clone());
            }
            Self::AttachGeometry { object, geometry } => {
                line.arg(object.to_string());
                line.opt(geometry.as_ref().map(ToString::to_string));
            }
            Self::CreateGeometry { geometry } => line.arg(geometry.to_string()),
            Self::CreateSprite { geometry, width, height, anchor, size_mode, image } => {
                line.arg(geometry.to_string());
                line.arg(args::format_float(*width));
                line.arg(args::format_float(*height));
                line.arg(anchor.to_string());
                line.arg(size_mode.to_string());
                line.arg(image.uri.to_string());
                line.arg(args::format_bytes(&image.sha256));
            }
            Self::CreateText { geometry, width, height, anchor, size_mode, font, text } => {
                line.arg(geometry.to_string());
                line.arg(args::format_float(*width));
                line.arg(args::format_float(*height));
                line.arg(anchor.to_string());
                line.arg(size_mode.to_string());
                line.arg(font.uri.to_string());
                line.arg(args::format_bytes(&font.sha256));
                line.arg(text.clone());
            }
            Self::SetText { geometry, text } => {
                line.arg(geometry.to_string());
                line.arg(text.clone());
            }
            Self::SetTextColor { geometry, color } => {
                line.arg(geometry.to_string());
                line.arg(color.to_string());
            }
            Self::SetTextBackground { geometry, background } => {
                line.arg(geometry.to_string());
                line.opt(background.map(|c| c.to_string()));
            }
            Self::DestroyGeometry { geometry } => line.arg(geometry.to_string()),
            Self::AddTriangleList { geometry, tag, triangles } => {
                line.arg(geometry.to_string());
                line.arg(tag.as_ref().map(ToString::to_string).unwrap_or_default());
                for t in triangles {
                    line.arg(t.color.to_string());
                    for v in t.vertices {
                        line.arg(args::format_vec3(v));
                    }
                }
            }
            Self::AddTriangleStrip { geometry, tag, color, vertices }
            | Self::AddTriangleFan { geometry, tag, color, vertices } => {
                line.arg(geometry.to_string());
                line.arg(tag.as_ref().map(ToString::to_string).unwrap_or_default());
                line.arg(color.to_string());
                for v in vertices {
                    line.arg(args::format_vec3(*v));
                }
            }
            Self::RemoveTriangles { geometry, tag } => {
                line.arg(geometry.to_string());
                line.arg(tag.to_string());
            }
            Self::CreateIntent { intent, label } => {
                line.arg(intent.to_string());
                line.arg(label.clone());
            }
            Self::DestroyIntent { intent } => line.arg(intent.to_string()),
            Self::Intent { intent } => line.arg(intent.to_string()),
            Self::TapObject { object, kind, tag } => {
                line.arg(object.to_string());
                line.arg(kind.to_string());
                line.arg(tag.to_string());
            }
            Self::TellObject { object, text } => {
                line.arg(object.to_string());
                line.arg(text.clone());
            }
            Self::RequestInput { prompt } => line.opt(prompt.clone()),
            Self::CancelInput | Self::RaycastRequest | Self::RaycastCancel => {}
            Self::SendInput { text } => line.arg(text.clone()),
            Self::Raycast { origin, direction } => {
                line.arg(args::format_vec3(*origin));
                line.arg(args::format_vec3(*direction));
            }
            Self::EnableFreeLook { enabled } => line.arg(args::format_bool(*enabled).to_owned()),
        }
        line.finish()
    }

    /// Encode with the CRLF terminator appended.
    pub fn to_wire(&self) -> Result<String, CommandError> {
        let mut line = self.encode()?;
        line.push_str("\r\n");
        Ok(line)
    }
}

fn parse_uri(s: &str) -> Option<Url> {
    // LF is framing-legal inside parameters but never inside a URI.
    if s.contains('\n') {
        return None;
    }
    Url::parse(s).ok()
}

fn parse_ident(s: &str) -> Option<Ident> {
    Ident::parse(s).ok()
}

fn parse_userid(s: &str) -> Option<UserId> {
    UserId::parse(s).ok()
}

fn parse_duration(s: &str) -> Option<f32> {
    args::parse_float(s).filter(|t| *t >= 0.0)
}

/// Cursor over the raw argument list implementing the optional-parameter
/// mapping.
struct Args<'a> {
    raw: &'a [&'a str],
    index: usize,
}

impl<'a> Args<'a> {
    fn new(_name: &str, raw: &'a [&'a str]) -> Self {
        Self { raw, index: 0 }
    }

    fn take(&mut self) -> Option<&'a str> {
        let value = self.raw.get(self.index).copied();
        if value.is_some() {
            self.index += 1;
        }
        value
    }

    fn err<T>(&self, expected: &'static str) -> Result<T, CommandError> {
        Err(CommandError::Arg(ArgError { index: self.index.saturating_sub(1), expected }))
    }

    /// Required typed argument. Present-but-empty counts as absent.
    fn req<T>(
        &mut self,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, CommandError> {
        match self.take() {
            Some(s) if !s.is_empty() => parse(s).map_or_else(|| self.err(expected), Ok),
            _ => self.err(expected),
        }
    }

    /// Optional typed argument: omitted or empty means absent.
    fn opt<T>(
        &mut self,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, CommandError> {
        match self.take() {
            None => Ok(None),
            Some("") => Ok(None),
            Some(s) => parse(s).map_or_else(|| self.err(expected), |v| Ok(Some(v))),
        }
    }

    /// Required string; must be present and non-empty.
    fn req_string(&mut self, expected: &'static str) -> Result<String, CommandError> {
        match self.take() {
            Some(s) if !s.is_empty() => Ok(s.to_owned()),
            _ => self.err(expected),
        }
    }

    /// Required zstring; must be present, may be empty.
    fn req_zstring(&mut self, expected: &'static str) -> Result<String, CommandError> {
        match self.take() {
            Some(s) => Ok(s.to_owned()),
            None => self.err(expected),
        }
    }

    /// Optional string; present-but-empty maps to absent.
    fn opt_string(&mut self) -> Option<String> {
        self.take().filter(|s| !s.is_empty()).map(str::to_owned)
    }

    /// Optional zstring; present-but-empty is the empty string.
    fn opt_zstring(&mut self) -> Option<String> {
        self.take().map(str::to_owned)
    }

    /// Required tag position with zstring semantics: empty means untagged.
    fn req_tag(&mut self) -> Result<Option<Tag>, CommandError> {
        match self.take() {
            Some("") => Ok(None),
            Some(s) => Tag::parse(s).map(Some).map_or_else(|_| self.err("tag"), Ok),
            None => self.err("tag"),
        }
    }

    /// A `(uri, sha256)` asset pair.
    fn req_asset(&mut self) -> Result<AssetRef, CommandError> {
        let uri = self.req("uri", parse_uri)?;
        let sha256 = self.req("bytes[32]", args::parse_bytes::<32>)?;
        Ok(AssetRef { uri, sha256 })
    }

    fn at_end(&self) -> bool {
        self.index >= self.raw.len()
    }

    /// Reject unconsumed trailing arguments.
    fn finish(self, name: &'static str) -> Result<(), CommandError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(CommandError::ArgCount { name, expected: "fewer", got: self.raw.len() })
        }
    }
}

/// Canonical line assembly: interior absent parameters become empty
/// strings, trailing absent parameters are omitted entirely.
struct LineBuilder {
    name: &'static str,
    args: Vec<Option<String>>,
}

impl LineBuilder {
    fn new(name: &'static str) -> Self {
        Self { name, args: Vec::new() }
    }

    fn arg(&mut self, value: String) {
        self.args.push(Some(value));
    }

    fn opt(&mut self, value: Option<String>) {
        self.args.push(value);
    }

    fn finish(mut self) -> Result<String, CommandError> {
        while self.args.last().is_some_and(Option::is_none) {
            self.args.pop();
        }
        let mut line = String::from(self.name);
        for arg in self.args {
            line.push('\t');
            if let Some(arg) = arg {
                line.push_str(&arg);
            }
        }
        if line.len() + 2 > MAX_FRAME_SIZE {
            return Err(CommandError::FrameTooLong { max: MAX_FRAME_SIZE });
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_c2s(frame: &str) -> Result<Command, CommandError> {
        Command::parse(frame, Sender::Client)
    }

    fn parse_s2c(frame: &str) -> Result<Command, CommandError> {
        Command::parse(frame, Sender::Server)
    }

    #[test]
    fn parses_minimal_scene_commands() {
        let c = parse_s2c("create-object\troom").unwrap();
        assert!(matches!(c, Command::CreateObject { .. }));

        let c = parse_s2c("add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)")
            .unwrap();
        match c {
            Command::AddTriangleList { geometry, tag, triangles } => {
                assert_eq!(geometry.as_str(), "$global");
                assert_eq!(tag.unwrap().as_str(), "floor");
                assert_eq!(triangles.len(), 1);
                assert_eq!(triangles[0].color, Color { r: 0x80, g: 0x80, b: 0x80 });
            }
            other => panic!("wrong command: {other:?}"),
        }

        let c = parse_s2c("set-object-property\troom\tclickable\ttrue").unwrap();
        assert!(matches!(c, Command::SetObjectProperty { .. }));
    }

    #[test]
    fn direction_is_enforced() {
        assert!(matches!(
            parse_c2s("create-object\troom"),
            Err(CommandError::WrongDirection { name: "create-object" })
        ));
        assert!(matches!(
            parse_s2c("tap-object\troom\tprimary\tfloor"),
            Err(CommandError::WrongDirection { name: "tap-object" })
        ));
        assert!(parse_s2c("chat\thi").is_ok());
        assert!(parse_c2s("chat\thi").is_ok());
    }

    #[test]
    fn unknown_command_is_reported() {
        assert!(matches!(parse_s2c("warp-object\tx"), Err(CommandError::UnknownCommand { .. })));
        assert!(matches!(parse_s2c(""), Err(CommandError::UnknownCommand { .. })));
    }

    #[test]
    fn optional_mapping_skips_interior_absents() {
        // pos omitted, rot given, scale omitted, duration given.
        let c = parse_s2c("set-object-transform\tball\t\t(0 90 0)\t\t2").unwrap();
        match c {
            Command::SetObjectTransform { pos, rot, scale, duration, .. } => {
                assert_eq!(pos, None);
                assert_eq!(rot, Some(Vec3::new(0.0, 90.0, 0.0)));
                assert_eq!(scale, None);
                assert_eq!(duration, 2.0);
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn negative_duration_is_invalid() {
        assert!(parse_s2c("set-object-transform\tball\t(1 0 0)\t\t\t-1").is_err());
    }

    #[test]
    fn trailing_extra_arguments_are_rejected() {
        assert!(matches!(
            parse_s2c("accept-user\talice\textra"),
            Err(CommandError::ArgCount { .. })
        ));
    }

    #[test]
    fn strip_needs_three_vertices() {
        assert!(parse_s2c("add-triangle-strip\tg\tt\t#ffffff\t(0 0 0)\t(1 0 0)").is_err());
        assert!(parse_s2c("add-triangle-strip\tg\tt\t#ffffff\t(0 0 0)\t(1 0 0)\t(1 1 0)").is_ok());
    }

    #[test]
    fn triangle_list_parses_multiple_groups() {
        let c = parse_s2c(concat!(
            "add-triangle-list\tg\t\t",
            "#ff0000\t(0 0 0)\t(1 0 0)\t(1 1 0)\t",
            "#00ff00\t(0 0 0)\t(0 1 0)\t(0 1 1)"
        ))
        .unwrap();
        match c {
            Command::AddTriangleList { tag, triangles, .. } => {
                assert_eq!(tag, None);
                assert_eq!(triangles.len(), 2);
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn hello_forms() {
        let c = parse_c2s("hackvr-hello\tv2\thackvr://example/world").unwrap();
        match c {
            Command::Hello { max_version, uri, session } => {
                assert_eq!(max_version.number(), 2);
                assert_eq!(uri.unwrap().as_str(), "hackvr://example/world");
                assert_eq!(session, None);
            }
            other => panic!("wrong command: {other:?}"),
        }
        assert!(parse_s2c("hackvr-hello\tv1").is_ok());
    }

    #[test]
    fn encode_round_trips() {
        let commands = [
            "chat\thello world",
            "request-user\tlogin required",
            "set-user\talice",
            "create-object\tdoor-{01..03}",
            "set-object-transform\tball\t(10 0 0)\t\t\t10",
            "track-object\tturret\tplayer\tplane\t0.5",
            "add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)",
            "remove-triangles\t$global\tfloor-*",
            "raycast\t(0 0 0)\t(0 0 -1)",
            "enable-free-look\ttrue",
            "tap-object\troom\tprimary\tfloor",
        ];
        for wire in commands {
            let sender =
                if Command::parse(wire, Sender::Server).is_ok() { Sender::Server } else { Sender::Client };
            let command = Command::parse(wire, sender).unwrap();
            assert_eq!(command.encode().unwrap(), wire, "canonical form should be stable");
        }
    }

    #[test]
    fn encode_emits_interior_empties_and_trims_trailing() {
        let c = parse_s2c("set-object-transform\tball\t\t(0 90 0)").unwrap();
        assert_eq!(c.encode().unwrap(), "set-object-transform\tball\t\t(0 90 0)");
    }

    #[test]
    fn overlong_encode_is_rejected() {
        let c = Command::Chat { message: "x".repeat(2000) };
        assert!(matches!(c.encode(), Err(CommandError::FrameTooLong { .. })));
    }

    #[test]
    fn zstring_vs_string_empties() {
        // reject-user reason is a plain string: present-but-empty is absent.
        let c = parse_s2c("reject-user\tmallory\t").unwrap();
        assert!(matches!(c, Command::RejectUser { reason: None, .. }));
        // request-user prompt is zstring: present-but-empty survives.
        let c = parse_s2c("request-user\t").unwrap();
        assert!(matches!(c, Command::RequestUser { prompt: Some(p) } if p.is_empty()));
        // set-object-property value is zstring.
        let c = parse_s2c("set-object-property\tdoor\thref\t").unwrap();
        assert!(matches!(c, Command::SetObjectProperty { value, .. } if value.is_empty()));
    }
}
