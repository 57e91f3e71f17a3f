//! The viewer state machine.
//!
//! One `Viewer` per established connection. It mirrors the server-authored
//! scene, runs the interaction gates, answers authentication challenges,
//! and assembles every viewer-originated command, so callers never build
//! wire lines by hand.
//!
//! Establishment happens before a `Viewer` exists: the driver runs
//! [`hackvr_core::RawClient`] (or the HTTP upgrade helpers) and constructs
//! the viewer once the connection is in the optimistic regime. From then on
//! every inbound frame is fed through [`Viewer::handle`]; parse failures
//! and wrong-direction commands drop that single frame, never the
//! connection.

use std::time::Duration;

use glam::Vec3;
use hackvr_core::{AnnouncedToken, ClientAuthenticator};
use hackvr_proto::{Command, Ident, Sender, SessionToken, Tag, TapKind, UserId};
use hackvr_scene::{SceneState, sprite_pick_tag};

use crate::{
    assets::{AssetCache, AssetKind},
    event::{Notice, PickTarget, ViewerAction, ViewerEvent},
    gates::{RaycastGate, TextInputGate},
};

/// Sans-IO viewer for one connection.
pub struct Viewer<I> {
    scene: SceneState<I>,
    text_gate: TextInputGate,
    raycast_gate: RaycastGate,
    assets: AssetCache,
    authenticator: Option<ClientAuthenticator>,
    announced: AnnouncedToken,
    connected: bool,
}

impl<I> Viewer<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// New viewer with default scene state.
    ///
    /// With an authenticator the viewer answers `request-user` with its
    /// identity; without one it stays `$anonymous`.
    #[must_use]
    pub fn new(authenticator: Option<ClientAuthenticator>) -> Self {
        Self {
            scene: SceneState::default(),
            text_gate: TextInputGate::default(),
            raycast_gate: RaycastGate::default(),
            assets: AssetCache::new(),
            authenticator,
            announced: AnnouncedToken::default(),
            connected: true,
        }
    }

    /// The mirrored scene.
    #[must_use]
    pub fn scene(&self) -> &SceneState<I> {
        &self.scene
    }

    /// The asset cache.
    #[must_use]
    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    /// The text-input gate (prompt and draft live here).
    #[must_use]
    pub fn text_input(&self) -> &TextInputGate {
        &self.text_gate
    }

    /// Mutable access for draft editing.
    pub fn text_input_mut(&mut self) -> &mut TextInputGate {
        &mut self.text_gate
    }

    /// Whether raycast mode is open.
    #[must_use]
    pub fn raycast_active(&self) -> bool {
        self.raycast_gate.is_active()
    }

    /// The session token announced on this connection, for reconnecting by
    /// hand later (the viewer itself never auto-reconnects).
    #[must_use]
    pub fn announced_token(&self) -> Option<&SessionToken> {
        self.announced.current()
    }

    /// Whether the transport is still up.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Ask the server to restore a previous session. Most viewers carry
    /// the token in the hello/upgrade instead; this is the explicit
    /// post-establishment form.
    #[must_use]
    pub fn resume_session(&self, token: SessionToken) -> Vec<ViewerAction> {
        vec![ViewerAction::Send(Command::ResumeSession { token })]
    }

    /// Process one event.
    pub fn handle(&mut self, event: ViewerEvent<I>) -> Vec<ViewerAction> {
        match event {
            ViewerEvent::Line { frame, now } => self.on_line(&frame, now),
            // Post-establishment frame damage costs that frame only.
            ViewerEvent::FrameViolation => Vec::new(),
            ViewerEvent::Pick { object, kind, target } => self.on_pick(&object, kind, &target),
            ViewerEvent::Tell { object, text } => self.on_tell(&object, text),
            ViewerEvent::Chat { text } => vec![ViewerAction::Send(Command::Chat { message: text })],
            ViewerEvent::InvokeIntent { intent } => self.on_intent(intent),
            ViewerEvent::SubmitInput { text } => self.on_submit_input(text),
            ViewerEvent::FireRay { origin, direction } => self.on_fire_ray(origin, direction),
            ViewerEvent::FreeLook { rotation } => {
                self.scene.set_free_look_rotation(rotation);
                Vec::new()
            }
            ViewerEvent::AssetFetched { asset, bytes } => {
                self.assets.on_fetched(&asset, bytes);
                Vec::new()
            }
            ViewerEvent::TransportClosed => {
                // Last rendered scene stays; gates and transitions die with
                // the transport.
                self.connected = false;
                self.text_gate.cancel();
                self.raycast_gate.cancel();
                vec![ViewerAction::Notify(Notice::Disconnected)]
            }
        }
    }

    fn on_line(&mut self, frame: &str, now: I) -> Vec<ViewerAction> {
        let Ok(command) = Command::parse(frame, Sender::Server) else {
            return Vec::new();
        };
        match command {
            Command::Chat { message } => vec![ViewerAction::Notify(Notice::Chat(message))],

            Command::RequestUser { prompt } => {
                let mut actions = vec![ViewerAction::Notify(Notice::Prompt(prompt))];
                let reply = match &self.authenticator {
                    Some(authenticator) => authenticator.set_user(),
                    None => Command::SetUser { user: UserId::anonymous() },
                };
                actions.push(ViewerAction::Send(reply));
                actions
            }
            Command::RequestAuthentication { user, nonce } => self
                .authenticator
                .as_ref()
                .and_then(|a| a.answer(&user, &nonce))
                .map(ViewerAction::Send)
                .into_iter()
                .collect(),
            Command::AcceptUser { user } => {
                vec![ViewerAction::Notify(Notice::UserAccepted(user))]
            }
            Command::RejectUser { user, reason } => {
                vec![ViewerAction::Notify(Notice::UserRejected { user, reason })]
            }

            Command::AnnounceSession { token } => {
                // A different token supersedes the old one; same token is a
                // refresh. Server-side bookkeeping mirrors this.
                let _superseded = self.announced.announce(token);
                Vec::new()
            }
            Command::RevokeSession { token } => {
                self.announced.revoke(&token);
                Vec::new()
            }

            Command::RequestInput { prompt } => {
                self.text_gate.open(prompt.clone());
                vec![ViewerAction::Notify(Notice::Prompt(prompt))]
            }
            Command::CancelInput => {
                self.text_gate.cancel();
                Vec::new()
            }
            Command::RaycastRequest => {
                self.raycast_gate.open();
                Vec::new()
            }
            Command::RaycastCancel => {
                self.raycast_gate.cancel();
                Vec::new()
            }

            // `hackvr-hello` must not appear after establishment.
            Command::Hello { .. } => Vec::new(),

            // Everything else is scene-owned; sprite creation also kicks
            // off the asset fetch.
            scene_command => {
                let fetch = match &scene_command {
                    Command::CreateSprite { image, .. } => {
                        Some((image.clone(), AssetKind::Image))
                    }
                    Command::CreateText { font, .. } => Some((font.clone(), AssetKind::Font)),
                    _ => None,
                };
                let outcome = self.scene.apply(&scene_command, now);
                let mut actions = Vec::new();
                if outcome.is_ok() {
                    if let Some((asset, kind)) = fetch {
                        if self.assets.request(&asset, kind) {
                            actions.push(ViewerAction::FetchAsset { asset, kind });
                        }
                    }
                }
                actions
            }
        }
    }

    fn on_pick(&mut self, object: &Ident, kind: TapKind, target: &PickTarget) -> Vec<ViewerAction> {
        let Some(state) = self.scene.object(object) else {
            return Vec::new();
        };
        let properties = state.properties().clone();

        // Tap, tell, and open-href are mutually exclusive per action; tell
        // needs typed text so a bare pick decides between tap and href.
        let tag: Option<Tag> = match target {
            PickTarget::Triangle { tag } => tag.clone(),
            PickTarget::Sprite { u, v } => Some(sprite_pick_tag(*u, *v)),
        };
        if properties.clickable {
            if let Some(tag) = tag {
                return vec![ViewerAction::Send(Command::TapObject {
                    object: object.clone(),
                    kind,
                    tag,
                })];
            }
        }
        if let Some(url) = properties.href {
            return vec![ViewerAction::ConfirmNavigation { url }];
        }
        Vec::new()
    }

    fn on_tell(&mut self, object: &Ident, text: String) -> Vec<ViewerAction> {
        let accepts = self
            .scene
            .object(object)
            .is_some_and(|state| state.properties().textinput);
        if !accepts {
            return Vec::new();
        }
        vec![ViewerAction::Send(Command::TellObject { object: object.clone(), text })]
    }

    fn on_intent(&mut self, intent: Ident) -> Vec<ViewerAction> {
        if self.scene.intent_label(&intent).is_none() {
            return Vec::new();
        }
        vec![ViewerAction::Send(Command::Intent { intent })]
    }

    fn on_submit_input(&mut self, text: String) -> Vec<ViewerAction> {
        if !self.text_gate.submit() {
            return Vec::new();
        }
        vec![ViewerAction::Send(Command::SendInput { text })]
    }

    fn on_fire_ray(&mut self, origin: Vec3, direction: Vec3) -> Vec<ViewerAction> {
        // A zero direction would be a command error server-side; keep the
        // mode open and let the user try again.
        if direction.length_squared() == 0.0 {
            return Vec::new();
        }
        if !self.raycast_gate.fire() {
            return Vec::new();
        }
        vec![ViewerAction::Send(Command::Raycast { origin, direction })]
    }
}
