//! The tracking rotation layer.
//!
//! `R_track` sits between an object's translation and its authored local
//! rotation, aiming the object at a target. The aimed rotation is computed
//! at sample time from current world positions, so a moving target is
//! followed instantly; the `t` parameter on `track-object` smooths the
//! *reconfiguration* (enabling, disabling, switching target or mode) by
//! blending from a snapshot of the previous aim, independent of target
//! motion.
//!
//! The target is a weak reference: a missing target contributes identity
//! until it reappears.

use std::time::Duration;

use glam::{Quat, Vec3};
use hackvr_proto::{Ident, TrackMode};

use crate::transform::{aim_focus, aim_plane, blend_rotation};

/// Active tracking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackConfig {
    /// Target object id.
    pub target: Ident,
    /// Aim mode.
    pub mode: TrackMode,
}

/// Smoothing blend across a reconfiguration.
#[derive(Debug, Clone, Copy)]
struct Blend<I> {
    from: Quat,
    start: I,
    duration: Duration,
}

/// Tracking state for one object.
#[derive(Debug, Clone)]
pub struct Tracking<I> {
    config: Option<TrackConfig>,
    blend: Option<Blend<I>>,
}

impl<I> Default for Tracking<I> {
    fn default() -> Self {
        Self { config: None, blend: None }
    }
}

impl<I> Tracking<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Current configuration, if tracking is enabled.
    #[must_use]
    pub fn config(&self) -> Option<&TrackConfig> {
        self.config.as_ref()
    }

    /// Reconfigure tracking. `previous` is the sampled `R_track` at the
    /// moment of the command; the blend starts there so the aim never
    /// jumps, whatever the old and new configurations were.
    pub fn reconfigure(
        &mut self,
        config: Option<TrackConfig>,
        previous: Quat,
        duration: Duration,
        now: I,
    ) {
        self.config = config;
        self.blend = (!duration.is_zero()).then_some(Blend { from: previous, start: now, duration });
    }

    /// Sample `R_track` at `now`.
    ///
    /// `aim_direction` resolves the target to a direction in the object's
    /// pre-rotation frame, or `None` while the target is missing.
    pub fn sample(&self, now: I, aim_direction: impl FnOnce(&TrackConfig) -> Option<Vec3>) -> Quat {
        let aimed = match &self.config {
            None => Quat::IDENTITY,
            Some(config) => match aim_direction(config) {
                None => Quat::IDENTITY,
                Some(dir) => match config.mode {
                    TrackMode::Plane => aim_plane(dir),
                    TrackMode::Focus => aim_focus(dir),
                },
            },
        };

        let Some(blend) = &self.blend else {
            return aimed;
        };
        if now <= blend.start {
            return blend.from;
        }
        let elapsed = now - blend.start;
        if elapsed >= blend.duration {
            return aimed;
        }
        let k = elapsed.as_secs_f32() / blend.duration.as_secs_f32();
        blend_rotation(blend.from, aimed, k)
    }
}
