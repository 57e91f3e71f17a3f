//! HackVR viewer client.
//!
//! The sans-IO half of a viewer: scene mirroring, interaction mode gates,
//! authentication answers, and outbound command assembly. The renderer,
//! windowing, asset decoding, and transport are external; they feed
//! [`ViewerEvent`]s in and execute [`ViewerAction`]s coming out.

pub mod assets;
pub mod event;
pub mod gates;
pub mod viewer;

pub use assets::{AssetCache, AssetKind, AssetState};
pub use event::{Notice, PickTarget, ViewerAction, ViewerEvent};
pub use gates::{RaycastGate, TextInputGate};
pub use viewer::Viewer;
