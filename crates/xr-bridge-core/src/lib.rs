//! Backend-independent XR core
//!
//! Sessions, frame scheduling, coordinate systems and anchor lifecycle for
//! applications that must run unchanged over a native AR bridge, a
//! head-mounted display or plain orientation sensors.
//!
//! The moving parts, leaf first:
//!
//! - [`math`]: column-major matrices, quaternions and projections
//! - [`coordinates`]: frames of reference and poses expressed in them
//! - [`anchor`]: anchors, anchor offsets and hit-test selection
//! - [`reality`]: anchor tables and the backends that feed them
//! - [`display`]: pose adaptation for each tracking technology
//! - [`session`] and [`frame`]: the frame loop and its per-tick view
//! - [`bridge`]: the correlated request/response channel to a native bridge

pub mod anchor;
pub mod bridge;
pub mod coordinates;
pub mod display;
pub mod error;
pub mod events;
pub mod frame;
pub mod math;
pub mod reality;
pub mod scheduler;
pub mod session;
pub mod worker;

pub use anchor::{Anchor, AnchorId, AnchorOffset, AnchorPayload, HitResult, HitTestType};
pub use coordinates::{
    CoordinateSystem, CoordinateSystemType, Coordinates, DevicePoses, SITTING_EYE_HEIGHT,
    STANDING_EYE_HEIGHT,
};
pub use display::{Display, DisplayBackend, DisplayConfig, View};
pub use error::{Result, XrError};
pub use events::{EventRegistry, ListenerId};
pub use frame::PresentationFrame;
pub use math::{Matrix4, Quaternion, Vector3D};
pub use reality::{AnchorUpdate, Reality, RealityBackend};
pub use scheduler::{FramePacing, FrameScheduler, ManualScheduler};
pub use session::{Session, SessionConfig, SessionKind, SessionParameters, SessionState};
