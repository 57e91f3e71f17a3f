//! The server-authored scene: objects, geometries, intents.
//!
//! [`SceneState::apply`] is the single entry point for every S→C scene
//! command. Selector-expanded commands are atomic: targets are resolved and
//! validated up front, and either the whole batch applies or the command is
//! dropped. All selector commands are idempotent under duplicate
//! application, so redundant expansion is harmless.
//!
//! The scene graph is a forest rooted at `$global`, held as an id-keyed
//! arena with parent back-references (children are derived, never stored,
//! so the two can never disagree). Tracking targets and attached geometry
//! ids are weak references: destroying the referent downgrades the
//! reference to a no-op instead of invalidating the referrer.

use std::{collections::BTreeMap, time::Duration};

use glam::{Affine3A, Quat, Vec3};
use hackvr_proto::{Command, GLOBAL, Ident, ReparentMode, Selector, TrackMode};
use url::Url;

use crate::{
    error::{DropReason, Outcome},
    geometry::{DEFAULT_TEXT_COLOR, DEFAULT_TRIANGLE_CAP, Geometry, Sprite, SpriteRect, TextSprite},
    object::{DEFAULT_NESTING_CAP, DEFAULT_OBJECT_CAP, Object},
    tracking::TrackConfig,
    transform::euler_deg_to_quat,
};

/// Resource limits, all soft defaults from the protocol.
#[derive(Debug, Clone)]
pub struct SceneLimits {
    /// Objects per scene.
    pub max_objects: usize,
    /// Triangles per geometry.
    pub max_triangles: usize,
    /// Scene-graph nesting depth.
    pub max_nesting: usize,
    /// Materialized create-selector expansion size.
    pub create_expansion_cap: usize,
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            max_objects: DEFAULT_OBJECT_CAP,
            max_triangles: DEFAULT_TRIANGLE_CAP,
            max_nesting: DEFAULT_NESTING_CAP,
            create_expansion_cap: hackvr_proto::DEFAULT_CREATE_EXPANSION_CAP,
        }
    }
}

/// What happens to in-flight transitions across a `mode=local` reparent.
///
/// The source protocol leaves this undefined, so it is configuration. A
/// `mode=world` reparent (and the reparent-to-root on destroy) always
/// rebases the channels and cancels transitions: a world-space target
/// cannot be re-expressed per channel in the new space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionReparent {
    /// Keep channel records; transitions continue in the new local space.
    #[default]
    ContinueLocal,
    /// Freeze channels at their current interpolated values.
    Restart,
}

/// Viewer free-look state layered onto the camera.
#[derive(Debug, Clone, Copy)]
struct FreeLook {
    enabled: bool,
    rotation: Quat,
}

/// Labels for the predefined intents.
const PREDEFINED_INTENTS: &[(&str, &str)] = &[
    ("$forward", "Forward"),
    ("$back", "Back"),
    ("$left", "Left"),
    ("$right", "Right"),
    ("$up", "Up"),
    ("$down", "Down"),
    ("$stop", "Stop"),
];

/// The full per-connection scene state.
#[derive(Debug)]
pub struct SceneState<I> {
    objects: BTreeMap<Ident, Object<I>>,
    geometries: BTreeMap<Ident, Geometry>,
    intents: BTreeMap<Ident, String>,
    free_look: FreeLook,
    limits: SceneLimits,
    reparent_policy: TransitionReparent,
}

impl<I> Default for SceneState<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(SceneLimits::default(), TransitionReparent::default())
    }
}

impl<I> SceneState<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Fresh scene: `$global` and `$camera` objects, the `$global` soup,
    /// and the predefined intents.
    #[must_use]
    pub fn new(limits: SceneLimits, reparent_policy: TransitionReparent) -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(Ident::global(), Object::new(None));
        objects.insert(Ident::camera(), Object::new(Some(Ident::global())));

        let mut geometries = BTreeMap::new();
        geometries.insert(Ident::global(), Geometry::empty_soup());

        let intents = PREDEFINED_INTENTS
            .iter()
            .filter_map(|(id, label)| Some((Ident::parse(id).ok()?, (*label).to_owned())))
            .collect();

        Self {
            objects,
            geometries,
            intents,
            free_look: FreeLook { enabled: false, rotation: Quat::IDENTITY },
            limits,
            reparent_policy,
        }
    }

    // Accessors

    /// Look up an object.
    #[must_use]
    pub fn object(&self, id: &Ident) -> Option<&Object<I>> {
        self.objects.get(id)
    }

    /// Look up a geometry.
    #[must_use]
    pub fn geometry(&self, id: &Ident) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    /// Intent label, if registered.
    #[must_use]
    pub fn intent_label(&self, id: &Ident) -> Option<&str> {
        self.intents.get(id).map(String::as_str)
    }

    /// All object ids, in stable order.
    pub fn object_ids(&self) -> impl Iterator<Item = &Ident> {
        self.objects.keys()
    }

    /// Number of objects, predefined ones included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// World transform of an object at `now`, `None` if it does not exist.
    #[must_use]
    pub fn world_transform(&self, id: &Ident, now: I) -> Option<Affine3A> {
        let mut visiting = Vec::new();
        self.world_affine_inner(id, now, &mut visiting)
    }

    /// The camera's render rotation: `R_track ∘ R_local ∘ R_free`.
    #[must_use]
    pub fn camera_render_rotation(&self, now: I) -> Quat {
        let camera = Ident::camera();
        let mut visiting = Vec::new();
        let track = self.track_rotation_of(&camera, now, &mut visiting);
        let local =
            self.objects.get(&camera).map_or(Quat::IDENTITY, |object| object.rot.sample(now));
        let free = if self.free_look.enabled { self.free_look.rotation } else { Quat::IDENTITY };
        track * local * free
    }

    /// Whether free-look is currently enabled.
    #[must_use]
    pub fn free_look_enabled(&self) -> bool {
        self.free_look.enabled
    }

    /// Viewer input: set the free-look rotation. Ignored while disabled.
    pub fn set_free_look_rotation(&mut self, rotation: Quat) {
        if self.free_look.enabled {
            self.free_look.rotation = rotation;
        }
    }

    // Command application

    /// Apply one server scene command at `now`.
    pub fn apply(&mut self, command: &Command, now: I) -> Outcome {
        match command {
            Command::CreateObject { object, parent } => {
                self.create_objects(object, parent.as_ref())
            }
            Command::DestroyObject { object } => self.destroy_objects(object, now),
            Command::ReparentObject { object, parent, mode } => {
                self.reparent_objects(object, parent, *mode, now)
            }
            Command::SetObjectTransform { object, pos, rot, scale, duration } => {
                self.set_transform(object, *pos, *rot, *scale, *duration, now)
            }
            Command::TrackObject { object, target, mode, duration } => {
                self.track_objects(object, target.as_ref(), *mode, *duration, now)
            }
            Command::SetObjectProperty { object, key, value } => {
                self.set_property(object, key, value)
            }
            Command::AttachGeometry { object, geometry } => {
                self.attach_geometry(object, geometry.as_ref())
            }
            Command::CreateGeometry { geometry } => {
                self.create_geometries(geometry, &Geometry::empty_soup())
            }
            Command::CreateSprite { geometry, width, height, anchor, size_mode, image } => {
                let template = Geometry::Sprite(Sprite {
                    rect: SpriteRect {
                        width: *width,
                        height: *height,
                        anchor: *anchor,
                        size_mode: *size_mode,
                    },
                    image: image.clone(),
                });
                self.create_geometries(geometry, &template)
            }
            Command::CreateText { geometry, width, height, anchor, size_mode, font, text } => {
                let template = Geometry::Text(TextSprite {
                    rect: SpriteRect {
                        width: *width,
                        height: *height,
                        anchor: *anchor,
                        size_mode: *size_mode,
                    },
                    font: font.clone(),
                    text: text.clone(),
                    color: DEFAULT_TEXT_COLOR,
                    background: None,
                });
                self.create_geometries(geometry, &template)
            }
            Command::SetText { geometry, text } => {
                self.mutate_text(geometry, |sprite| sprite.text = text.clone())
            }
            Command::SetTextColor { geometry, color } => {
                self.mutate_text(geometry, |sprite| sprite.color = *color)
            }
            Command::SetTextBackground { geometry, background } => {
                self.mutate_text(geometry, |sprite| sprite.background = *background)
            }
            Command::DestroyGeometry { geometry } => self.destroy_geometries(geometry),
            Command::AddTriangleList { geometry, tag, triangles } => {
                self.add_triangles(geometry, |g, cap| g.add_list(tag.as_ref(), triangles, cap))
            }
            Command::AddTriangleStrip { geometry, tag, color, vertices } => self
                .add_triangles(geometry, |g, cap| g.add_strip(tag.as_ref(), *color, vertices, cap)),
            Command::AddTriangleFan { geometry, tag, color, vertices } => self
                .add_triangles(geometry, |g, cap| g.add_fan(tag.as_ref(), *color, vertices, cap)),
            Command::RemoveTriangles { geometry, tag } => self.remove_triangles(geometry, tag),
            Command::CreateIntent { intent, label } => {
                self.intents.insert(intent.clone(), label.clone());
                Outcome::Applied
            }
            Command::DestroyIntent { intent } => {
                let matched: Vec<Ident> =
                    self.intents.keys().filter(|id| intent.matches(id.as_str())).cloned().collect();
                if matched.is_empty() {
                    return Outcome::NoOp;
                }
                for id in matched {
                    self.intents.remove(&id);
                }
                Outcome::Applied
            }
            Command::EnableFreeLook { enabled } => {
                self.free_look.enabled = *enabled;
                if !enabled {
                    self.free_look.rotation = Quat::IDENTITY;
                }
                Outcome::Applied
            }
            _ => Outcome::Dropped(DropReason::NotSceneCommand),
        }
    }

    // Objects

    fn create_objects(&mut self, selector: &Selector, parent: Option<&Ident>) -> Outcome {
        let ids = match selector.expand_create(self.limits.create_expansion_cap) {
            Ok(ids) => ids,
            Err(err) => return Outcome::Dropped(DropReason::Selector(err)),
        };
        if ids.is_empty() {
            return Outcome::NoOp;
        }
        if ids.iter().any(Ident::is_reserved) {
            return Outcome::Dropped(DropReason::ForbiddenIdentifier);
        }
        if ids.iter().any(|id| self.objects.contains_key(id)) {
            return Outcome::Dropped(DropReason::DuplicateCreate);
        }

        let parent = parent.cloned().unwrap_or_else(Ident::global);
        if !self.objects.contains_key(&parent) {
            return Outcome::NoOp;
        }
        if self.depth(&parent) + 1 > self.limits.max_nesting {
            return Outcome::Dropped(DropReason::LimitExceeded);
        }
        if self.objects.len() + ids.len() > self.limits.max_objects {
            return Outcome::Dropped(DropReason::LimitExceeded);
        }

        for id in ids {
            self.objects.insert(id, Object::new(Some(parent.clone())));
        }
        Outcome::Applied
    }

    fn destroy_objects(&mut self, selector: &Selector, now: I) -> Outcome {
        if let Some(concrete) = selector.as_concrete() {
            if concrete == GLOBAL || concrete == hackvr_proto::CAMERA {
                return Outcome::Dropped(DropReason::ForbiddenIdentifier);
            }
        }
        // The command definition excludes the two predefined objects from
        // wildcard matches.
        let targets = self.matched_objects(selector, &[GLOBAL, hackvr_proto::CAMERA]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        for id in targets {
            self.destroy_single(&id, now);
        }
        Outcome::Applied
    }

    fn destroy_single(&mut self, id: &Ident, now: I) {
        if !self.objects.contains_key(id) {
            return;
        }
        let children: Vec<Ident> = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent() == Some(id))
            .map(|(child, _)| child.clone())
            .collect();
        // Children hop to the root keeping their world pose.
        for child in children {
            self.rebase_preserving_world(&child, &Ident::global(), now);
        }
        self.objects.remove(id);
    }

    fn reparent_objects(
        &mut self,
        selector: &Selector,
        parent: &Ident,
        mode: ReparentMode,
        now: I,
    ) -> Outcome {
        if selector.as_concrete() == Some(GLOBAL) {
            return Outcome::Dropped(DropReason::ReparentRejected);
        }
        let targets = self.matched_objects(selector, &[GLOBAL]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        if !self.objects.contains_key(parent) {
            return Outcome::NoOp;
        }
        // Loop formation: the new parent may not be any target or a
        // descendant of one. Checked for the whole batch before any move.
        for id in &targets {
            if parent == id || self.is_descendant(parent, id) {
                return Outcome::Dropped(DropReason::ReparentRejected);
            }
        }
        if self.depth(parent) + 1 > self.limits.max_nesting {
            return Outcome::Dropped(DropReason::LimitExceeded);
        }

        for id in &targets {
            match mode {
                ReparentMode::World => {
                    self.rebase_preserving_world(id, parent, now);
                }
                ReparentMode::Local => {
                    if self.reparent_policy == TransitionReparent::Restart {
                        if let Some(object) = self.objects.get_mut(id) {
                            object.pos.freeze(now);
                            object.rot.freeze(now);
                            object.scale.freeze(now);
                        }
                    }
                    if let Some(object) = self.objects.get_mut(id) {
                        object.parent = Some(parent.clone());
                    }
                }
            }
        }
        Outcome::Applied
    }

    /// Move `id` under `new_parent` so that its world transform at `now` is
    /// unchanged. Channels snap to the rebased values; a world pose cannot
    /// be expressed as in-flight per-channel transitions in the new space.
    fn rebase_preserving_world(&mut self, id: &Ident, new_parent: &Ident, now: I) {
        let Some(world) = self.world_transform(id, now) else {
            return;
        };
        let parent_world =
            self.world_transform(new_parent, now).unwrap_or(Affine3A::IDENTITY);
        let mut visiting = Vec::new();
        let track = self.track_rotation_of(id, now, &mut visiting);

        let local = parent_world.inverse() * world;
        let (scale, rotation, translation) = local.to_scale_rotation_translation();

        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        object.parent = Some(new_parent.clone());
        object.pos.snap(translation);
        // The decomposed rotation contains the tracking layer; peel it off
        // so it is not applied twice.
        object.rot.snap(track.inverse() * rotation);
        object.scale.snap(scale);
    }

    fn set_transform(
        &mut self,
        selector: &Selector,
        pos: Option<Vec3>,
        rot: Option<Vec3>,
        scale: Option<Vec3>,
        duration: f32,
        now: I,
    ) -> Outcome {
        let Some(duration) = wire_duration(duration) else {
            return Outcome::Dropped(DropReason::BadPropertyValue);
        };
        let targets = self.matched_objects(selector, &[]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        let rot = rot.map(euler_deg_to_quat);
        for id in targets {
            let Some(object) = self.objects.get_mut(&id) else { continue };
            if let Some(pos) = pos {
                object.pos.set(pos, duration, now);
            }
            if let Some(rot) = rot {
                // Always authored onto the local layer, never tracking.
                object.rot.set(rot, duration, now);
            }
            if let Some(scale) = scale {
                object.scale.set(scale, duration, now);
            }
        }
        Outcome::Applied
    }

    fn track_objects(
        &mut self,
        selector: &Selector,
        target: Option<&Ident>,
        mode: TrackMode,
        duration: f32,
        now: I,
    ) -> Outcome {
        let Some(duration) = wire_duration(duration) else {
            return Outcome::Dropped(DropReason::BadPropertyValue);
        };
        let targets = self.matched_objects(selector, &[]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        if let Some(tracked) = target {
            for id in &targets {
                if tracked == id || self.is_descendant(tracked, id) {
                    return Outcome::Dropped(DropReason::TrackTargetInvalid);
                }
            }
        }
        // Sample the outgoing aim before touching anything so the blend
        // starts where the object is actually pointing.
        let previous: Vec<(Ident, Quat)> = targets
            .iter()
            .map(|id| {
                let mut visiting = Vec::new();
                (id.clone(), self.track_rotation_of(id, now, &mut visiting))
            })
            .collect();

        let config = target.map(|t| TrackConfig { target: t.clone(), mode });
        for (id, previous_aim) in previous {
            if let Some(object) = self.objects.get_mut(&id) {
                object.tracking.reconfigure(config.clone(), previous_aim, duration, now);
            }
        }
        Outcome::Applied
    }

    fn set_property(&mut self, selector: &Selector, key: &Ident, value: &str) -> Outcome {
        enum Update {
            Clickable(bool),
            TextInput(bool),
            Href(Option<Url>),
        }

        let update = match key.as_str() {
            "clickable" => match hackvr_proto::args::parse_bool(value) {
                Some(flag) => Update::Clickable(flag),
                None => return Outcome::Dropped(DropReason::BadPropertyValue),
            },
            "textinput" => match hackvr_proto::args::parse_bool(value) {
                Some(flag) => Update::TextInput(flag),
                None => return Outcome::Dropped(DropReason::BadPropertyValue),
            },
            "href" => {
                if value.is_empty() {
                    Update::Href(None)
                } else if value.contains('\n') {
                    return Outcome::Dropped(DropReason::BadPropertyValue);
                } else {
                    match Url::parse(value) {
                        Ok(url) => Update::Href(Some(url)),
                        Err(_) => return Outcome::Dropped(DropReason::BadPropertyValue),
                    }
                }
            }
            _ => return Outcome::Dropped(DropReason::BadPropertyValue),
        };

        let targets = self.matched_objects(selector, &[]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        for id in targets {
            let Some(object) = self.objects.get_mut(&id) else { continue };
            match &update {
                Update::Clickable(flag) => object.properties.clickable = *flag,
                Update::TextInput(flag) => object.properties.textinput = *flag,
                Update::Href(url) => object.properties.href = url.clone(),
            }
        }
        Outcome::Applied
    }

    fn attach_geometry(&mut self, selector: &Selector, geometry: Option<&Ident>) -> Outcome {
        if let Some(geometry) = geometry {
            if !self.geometries.contains_key(geometry) {
                return Outcome::NoOp;
            }
        }
        let targets = self.matched_objects(selector, &[]);
        if targets.is_empty() {
            return Outcome::NoOp;
        }
        for id in targets {
            if let Some(object) = self.objects.get_mut(&id) {
                object.geometry = geometry.cloned();
            }
        }
        Outcome::Applied
    }

    // Geometries

    fn create_geometries(&mut self, selector: &Selector, template: &Geometry) -> Outcome {
        let ids = match selector.expand_create(self.limits.create_expansion_cap) {
            Ok(ids) => ids,
            Err(err) => return Outcome::Dropped(DropReason::Selector(err)),
        };
        if ids.is_empty() {
            return Outcome::NoOp;
        }
        if ids.iter().any(Ident::is_reserved) {
            return Outcome::Dropped(DropReason::ForbiddenIdentifier);
        }
        if ids.iter().any(|id| self.geometries.contains_key(id)) {
            return Outcome::Dropped(DropReason::DuplicateCreate);
        }
        for id in ids {
            self.geometries.insert(id, template.clone());
        }
        Outcome::Applied
    }

    fn destroy_geometries(&mut self, selector: &Selector) -> Outcome {
        if selector.as_concrete() == Some(GLOBAL) {
            return Outcome::Dropped(DropReason::ForbiddenIdentifier);
        }
        // `$global` always exists as a soup; wildcards step around it.
        let matched: Vec<Ident> = self
            .geometries
            .keys()
            .filter(|id| id.as_str() != GLOBAL && selector.matches(id.as_str()))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Outcome::NoOp;
        }
        for id in matched {
            // Attached objects keep a weak reference; it simply stops
            // resolving, the same as a destroyed tracking target.
            self.geometries.remove(&id);
        }
        Outcome::Applied
    }

    fn mutate_text(
        &mut self,
        selector: &Selector,
        mutate: impl Fn(&mut TextSprite),
    ) -> Outcome {
        let matched: Vec<Ident> = self
            .geometries
            .keys()
            .filter(|id| selector.matches(id.as_str()))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Outcome::NoOp;
        }
        // Atomicity: verify every matched geometry is a text sprite before
        // mutating any of them.
        if matched
            .iter()
            .any(|id| !matches!(self.geometries.get(id), Some(Geometry::Text(_))))
        {
            return Outcome::Dropped(DropReason::VariantMismatch);
        }
        for id in matched {
            if let Some(sprite) = self.geometries.get_mut(&id).and_then(Geometry::as_text_mut) {
                mutate(sprite);
            }
        }
        Outcome::Applied
    }

    fn add_triangles(
        &mut self,
        geometry: &Ident,
        add: impl FnOnce(&mut Geometry, usize) -> bool,
    ) -> Outcome {
        let cap = self.limits.max_triangles;
        let Some(entry) = self.geometries.get_mut(geometry) else {
            return Outcome::NoOp;
        };
        if !matches!(entry, Geometry::Soup { .. }) {
            return Outcome::Dropped(DropReason::VariantMismatch);
        }
        if add(entry, cap) { Outcome::Applied } else { Outcome::Dropped(DropReason::LimitExceeded) }
    }

    fn remove_triangles(&mut self, geometry: &Selector, tag: &Selector) -> Outcome {
        let matched: Vec<Ident> = self
            .geometries
            .keys()
            .filter(|id| geometry.matches(id.as_str()))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Outcome::NoOp;
        }
        let mut removed = 0;
        for id in matched {
            if let Some(entry) = self.geometries.get_mut(&id) {
                removed += entry.remove_triangles(tag);
            }
        }
        if removed > 0 { Outcome::Applied } else { Outcome::NoOp }
    }

    // Graph helpers

    fn matched_objects(&self, selector: &Selector, exclude: &[&str]) -> Vec<Ident> {
        self.objects
            .keys()
            .filter(|id| !exclude.contains(&id.as_str()) && selector.matches(id.as_str()))
            .cloned()
            .collect()
    }

    /// Nesting depth: `$global` is 0.
    fn depth(&self, id: &Ident) -> usize {
        let mut depth = 0;
        let mut current = id.clone();
        while let Some(parent) = self.objects.get(&current).and_then(|o| o.parent().cloned()) {
            depth += 1;
            current = parent;
            if depth > self.limits.max_nesting {
                break;
            }
        }
        depth
    }

    /// Whether `candidate` sits somewhere below `ancestor`.
    fn is_descendant(&self, candidate: &Ident, ancestor: &Ident) -> bool {
        let mut current = candidate.clone();
        while let Some(parent) = self.objects.get(&current).and_then(|o| o.parent().cloned()) {
            if parent == *ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    fn world_affine_inner(
        &self,
        id: &Ident,
        now: I,
        visiting: &mut Vec<Ident>,
    ) -> Option<Affine3A> {
        let object = self.objects.get(id)?;
        let parent = match object.parent() {
            None => Affine3A::IDENTITY,
            Some(p) => self.world_affine_inner(p, now, visiting)?,
        };
        let pre = parent * Affine3A::from_translation(object.pos.sample(now));
        let track = self.track_rotation_at(id, object, pre, now, visiting);
        Some(local_compose(pre, track, object.rot.sample(now), object.scale.sample(now)))
    }

    /// The sampled `R_track` of one object.
    fn track_rotation_of(&self, id: &Ident, now: I, visiting: &mut Vec<Ident>) -> Quat {
        let Some(object) = self.objects.get(id) else {
            return Quat::IDENTITY;
        };
        let parent = object
            .parent()
            .and_then(|p| self.world_affine_inner(p, now, visiting))
            .unwrap_or(Affine3A::IDENTITY);
        let pre = parent * Affine3A::from_translation(object.pos.sample(now));
        self.track_rotation_at(id, object, pre, now, visiting)
    }

    fn track_rotation_at(
        &self,
        id: &Ident,
        object: &Object<I>,
        pre: Affine3A,
        now: I,
        visiting: &mut Vec<Ident>,
    ) -> Quat {
        // Mutual tracking would recurse forever; re-entry contributes
        // identity, matching the missing-target rule.
        if visiting.contains(id) {
            return Quat::IDENTITY;
        }
        visiting.push(id.clone());
        let rotation = object.tracking.sample(now, |config| {
            let target = self.world_affine_inner(&config.target, now, visiting)?;
            let direction = pre.inverse().transform_point3(target.translation.into());
            (direction.length_squared() > 1e-12).then_some(direction)
        });
        visiting.pop();
        rotation
    }
}

/// Seconds off the wire into a `Duration`; the parser already rejects
/// negatives, this guards programmatic construction.
fn wire_duration(seconds: f32) -> Option<Duration> {
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f32(seconds))
}

/// `pre ∘ R_track ∘ R_local ∘ Scale`: the tail of the chain after the
/// translation has been folded into `pre`.
fn local_compose(pre: Affine3A, track: Quat, local: Quat, scale: Vec3) -> Affine3A {
    pre * Affine3A::from_quat(track) * Affine3A::from_quat(local) * Affine3A::from_scale(scale)
}
