//! Objects: transform channels, tracking, properties.

use glam::{Quat, Vec3};
use hackvr_proto::Ident;
use url::Url;

use crate::{tracking::Tracking, transition::Channel};

/// Default cap on object count.
pub const DEFAULT_OBJECT_CAP: usize = 10_000;

/// Default cap on scene-graph nesting depth.
pub const DEFAULT_NESTING_CAP: usize = 16;

/// Interaction properties of an object.
///
/// `href` exposes an "open URL" affordance in the viewer; it is always an
/// absolute URI and clearing it removes the affordance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Whether picks on tagged triangles produce `tap-object`.
    pub clickable: bool,
    /// Whether the object accepts `tell-object` text.
    pub textinput: bool,
    /// Navigation target, if set.
    pub href: Option<Url>,
}

/// One scene object.
///
/// The transform is three independent channels plus the tracking layer;
/// everything samples against a caller-supplied instant, so the object has
/// no clock of its own.
#[derive(Debug, Clone)]
pub struct Object<I> {
    /// Parent id; `$global` is the only object without one.
    pub(crate) parent: Option<Ident>,
    /// Local position channel.
    pub(crate) pos: Channel<Vec3, I>,
    /// Local rotation channel (Euler authored, quaternion stored).
    pub(crate) rot: Channel<Quat, I>,
    /// Local scale channel.
    pub(crate) scale: Channel<Vec3, I>,
    /// Tracking layer.
    pub(crate) tracking: Tracking<I>,
    /// Attached geometry, if any.
    pub(crate) geometry: Option<Ident>,
    /// Interaction properties.
    pub(crate) properties: Properties,
}

impl<I> Object<I>
where
    I: Copy + Ord + std::ops::Sub<Output = std::time::Duration>,
{
    /// A fresh object under `parent` with the identity transform.
    #[must_use]
    pub fn new(parent: Option<Ident>) -> Self {
        Self {
            parent,
            pos: Channel::new(Vec3::ZERO),
            rot: Channel::new(Quat::IDENTITY),
            scale: Channel::new(Vec3::ONE),
            tracking: Tracking::default(),
            geometry: None,
            properties: Properties::default(),
        }
    }

    /// Parent id; `None` only for `$global`.
    #[must_use]
    pub fn parent(&self) -> Option<&Ident> {
        self.parent.as_ref()
    }

    /// Attached geometry id.
    #[must_use]
    pub fn geometry(&self) -> Option<&Ident> {
        self.geometry.as_ref()
    }

    /// Interaction properties.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Local position at `now`.
    #[must_use]
    pub fn position(&self, now: I) -> Vec3 {
        self.pos.sample(now)
    }

    /// Local rotation at `now` (the authored layer, not tracking).
    #[must_use]
    pub fn rotation(&self, now: I) -> Quat {
        self.rot.sample(now)
    }

    /// Local scale at `now`.
    #[must_use]
    pub fn scale(&self, now: I) -> Vec3 {
        self.scale.sample(now)
    }

    /// Whether any channel is mid-transition at `now`.
    #[must_use]
    pub fn in_transition(&self, now: I) -> bool {
        self.pos.is_transitioning(now)
            || self.rot.is_transitioning(now)
            || self.scale.is_transitioning(now)
    }
}
