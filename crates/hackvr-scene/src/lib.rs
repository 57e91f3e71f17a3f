//! HackVR scene state engine.
//!
//! The server-authored world as the viewer mirrors it: geometries (triangle
//! soups, image sprites, text sprites), the object forest rooted at
//! `$global`, per-channel transform transitions, the tracking rotation
//! layer, and the intent registry.
//!
//! The engine is time-parametric: nothing here reads a clock. Commands are
//! applied at a caller-supplied instant and transforms are sampled at a
//! caller-supplied instant, which makes transition semantics exactly
//! testable; see [`transition`] for the channel rules and [`transform`]
//! for the rotation conventions and the composition chain.

pub mod error;
pub mod geometry;
pub mod object;
pub mod scene;
pub mod tracking;
pub mod transform;
pub mod transition;

pub use error::{DropReason, Outcome};
pub use geometry::{Geometry, Sprite, SpriteRect, TextSprite, Triangle, sprite_pick_tag};
pub use object::{Object, Properties};
pub use scene::{SceneLimits, SceneState, TransitionReparent};
pub use tracking::{TrackConfig, Tracking};
pub use transform::euler_deg_to_quat;
pub use transition::Channel;
