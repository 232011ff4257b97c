//! Frames of reference and poses expressed in them

mod coordinate_system;
#[allow(clippy::module_inception)]
mod coordinates;
mod poses;

pub use coordinate_system::{CoordinateSystem, CoordinateSystemType};
pub use coordinates::Coordinates;
pub use poses::{DevicePoses, SharedPoses, SITTING_EYE_HEIGHT, STANDING_EYE_HEIGHT};
