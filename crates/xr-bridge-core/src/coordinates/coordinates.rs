//! Poses expressed in a particular coordinate system

use super::CoordinateSystem;
use crate::math::{Matrix4, Quaternion, Vector3D};

/// A position + orientation in one [`CoordinateSystem`]
#[derive(Debug, Clone)]
pub struct Coordinates {
    coordinate_system: CoordinateSystem,
    pose: Matrix4,
}

impl Coordinates {
    pub fn new(coordinate_system: CoordinateSystem, position: Vector3D, orientation: Quaternion) -> Self {
        Self {
            coordinate_system,
            pose: Matrix4::from_rotation_translation(orientation, position),
        }
    }

    /// A position with no rotation
    pub fn at(coordinate_system: CoordinateSystem, position: Vector3D) -> Self {
        Self::new(coordinate_system, position, Quaternion::IDENTITY)
    }

    pub fn from_matrix(coordinate_system: CoordinateSystem, pose: Matrix4) -> Self {
        Self {
            coordinate_system,
            pose,
        }
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    pub fn pose_matrix(&self) -> Matrix4 {
        self.pose
    }

    pub fn position(&self) -> Vector3D {
        self.pose.translation()
    }

    pub fn orientation(&self) -> Quaternion {
        self.pose.rotation()
    }

    /// Re-express this pose in `other`.
    ///
    /// Rigid (distance and angle preserving). `None` when no transform
    /// between the two systems is currently available.
    pub fn transformed_to(&self, other: &CoordinateSystem) -> Option<Coordinates> {
        let transform = self.coordinate_system.transform_to(other)?;
        Some(Coordinates::from_matrix(other.clone(), transform.multiply(&self.pose)))
    }
}
