//! Per-channel transform transitions.
//!
//! Each of pos/rot/scale is an independent channel. Authoring a channel
//! cancels any in-flight transition on that channel and starts a new one
//! *from its current interpolated value* at command-receipt time; omitted
//! channels keep whatever they were doing. At the end of the duration the
//! channel equals the target exactly: the final sample is the authored
//! value, not an interpolation that happens to land nearby.
//!
//! Time is viewer-monotonic and flows in from the caller, so a channel is a
//! pure function of `now` between authorings.

use std::time::Duration;

use glam::{Quat, Vec3};

use crate::transform::blend_rotation;

/// Values a channel can interpolate.
pub trait Blend: Copy {
    /// Interpolate from `a` to `b` with `k` in `[0, 1]`.
    fn blend(a: Self, b: Self, k: f32) -> Self;
}

impl Blend for Vec3 {
    fn blend(a: Self, b: Self, k: f32) -> Self {
        a.lerp(b, k)
    }
}

impl Blend for Quat {
    /// Shortest-arc spherical interpolation.
    fn blend(a: Self, b: Self, k: f32) -> Self {
        blend_rotation(a, b, k)
    }
}

/// An in-flight transition.
#[derive(Debug, Clone, Copy)]
struct InFlight<T, I> {
    from: T,
    to: T,
    start: I,
    duration: Duration,
}

/// One animatable channel.
#[derive(Debug, Clone, Copy)]
pub struct Channel<T, I> {
    value: T,
    in_flight: Option<InFlight<T, I>>,
}

impl<T, I> Channel<T, I>
where
    T: Blend,
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// A static channel holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self { value, in_flight: None }
    }

    /// The channel value at `now`.
    #[must_use]
    pub fn sample(&self, now: I) -> T {
        let Some(t) = &self.in_flight else {
            return self.value;
        };
        if now <= t.start {
            return t.from;
        }
        let elapsed = now - t.start;
        if elapsed >= t.duration {
            return t.to;
        }
        let k = elapsed.as_secs_f32() / t.duration.as_secs_f32();
        T::blend(t.from, t.to, k)
    }

    /// Author the channel: transition to `target` over `duration`.
    ///
    /// A zero duration is instantaneous. A nonzero duration starts from the
    /// current interpolated value, superseding any in-flight transition.
    pub fn set(&mut self, target: T, duration: Duration, now: I) {
        if duration.is_zero() {
            self.value = target;
            self.in_flight = None;
            return;
        }
        let from = self.sample(now);
        self.value = target;
        self.in_flight = Some(InFlight { from, to: target, start: now, duration });
    }

    /// Cancel any in-flight transition, freezing at the current value.
    pub fn freeze(&mut self, now: I) {
        self.value = self.sample(now);
        self.in_flight = None;
    }

    /// Overwrite with a static value, cancelling any transition.
    pub fn snap(&mut self, value: T) {
        self.value = value;
        self.in_flight = None;
    }

    /// Whether a transition is still running at `now`.
    #[must_use]
    pub fn is_transitioning(&self, now: I) -> bool {
        self.in_flight.as_ref().is_some_and(|t| now <= t.start || now - t.start < t.duration)
    }
}
