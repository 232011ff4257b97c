//! Pose math: vectors, quaternions and column-major 4x4 affine matrices
//!
//! Right-handed coordinate system:
//! - X: Right (+) / Left (-)
//! - Y: Up (+) / Down (-)
//! - Z: Backward (+) / Forward (-), the viewer looks down -Z

pub mod matrix;
mod projection;
mod quaternion;
mod vector3d;

pub use matrix::Matrix4;
pub use projection::{screen_to_ndc, Projection, ViewRay};
pub use quaternion::Quaternion;
pub use vector3d::Vector3D;
