//! Named frames of reference and the transforms between them

use super::SharedPoses;
use crate::error::{Result, XrError};
use crate::math::Matrix4;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kinds of frame of reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystemType {
    /// Rides with the viewer's head
    HeadModel,
    /// Fixed height above the ground, no rotation
    EyeLevel,
    /// Floor-level origin
    Stage,
    /// The backend's raw tracking frame
    Tracker,
    /// Earth-fixed frame; not supported by any display here
    Geospatial,
}

/// A frame of reference bound to one display's pose store.
///
/// Clones share the relative offset, so repositioning one handle (stage
/// bounds, anchor drift correction) is visible through every clone.
#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    kind: CoordinateSystemType,
    poses: SharedPoses,
    relative: Arc<RwLock<Matrix4>>,
}

impl CoordinateSystem {
    pub fn new(poses: SharedPoses, kind: CoordinateSystemType) -> Self {
        Self::with_relative(poses, kind, Matrix4::IDENTITY)
    }

    pub fn with_relative(poses: SharedPoses, kind: CoordinateSystemType, relative: Matrix4) -> Self {
        Self {
            kind,
            poses,
            relative: Arc::new(RwLock::new(relative)),
        }
    }

    /// A fresh system of another kind on the same display
    pub fn sibling(&self, kind: CoordinateSystemType) -> Self {
        Self::new(self.poses.clone(), kind)
    }

    pub fn kind(&self) -> CoordinateSystemType {
        self.kind
    }

    pub fn relative_matrix(&self) -> Matrix4 {
        *self.relative.read()
    }

    /// Reposition this system (and every clone of it)
    pub fn set_relative_matrix(&self, matrix: Matrix4) {
        *self.relative.write() = matrix;
    }

    /// Whether both systems read the same display's poses
    pub fn same_display(&self, other: &CoordinateSystem) -> bool {
        Arc::ptr_eq(&self.poses, &other.poses)
    }

    /// Whether both handles share one relative offset
    pub fn ptr_eq(&self, other: &CoordinateSystem) -> bool {
        Arc::ptr_eq(&self.relative, &other.relative)
    }

    /// This system's pose relative to the display's tracking origin
    pub fn current_pose_matrix(&self) -> Result<Matrix4> {
        let poses = self.poses.read();
        let unavailable = || XrError::FrameOfReferenceUnavailable(self.kind);
        match self.kind {
            CoordinateSystemType::HeadModel => poses.head.ok_or_else(unavailable),
            CoordinateSystemType::EyeLevel => poses.eye_level.ok_or_else(unavailable),
            CoordinateSystemType::Stage => {
                let stage = poses.stage.ok_or_else(unavailable)?;
                Ok(self.relative_matrix().multiply(&stage))
            }
            CoordinateSystemType::Tracker => Ok(self.relative_matrix().multiply(&poses.tracker)),
            CoordinateSystemType::Geospatial => {
                Err(XrError::UnknownCoordinateSystemType(self.kind))
            }
        }
    }

    /// The matrix that maps a point expressed in `self` into `other`'s frame.
    ///
    /// `None` when either pose is unavailable, the systems belong to
    /// different displays, or `other`'s pose cannot be inverted.
    pub fn transform_to(&self, other: &CoordinateSystem) -> Option<Matrix4> {
        if !self.same_display(other) {
            return None;
        }
        let from = self.current_pose_matrix().ok()?;
        let to = other.current_pose_matrix().ok()?;
        match to.try_inverse() {
            Some(inverse) => Some(inverse.multiply(&from)),
            None => {
                tracing::warn!(from = ?self.kind, to = ?other.kind, "target pose is not invertible");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::DevicePoses;
    use crate::math::{Quaternion, Vector3D};

    fn systems() -> (SharedPoses, CoordinateSystem, CoordinateSystem) {
        let poses = DevicePoses::seated(1.1).shared();
        poses.write().head = Some(Matrix4::from_rotation_translation(
            Quaternion::from_axis_angle(Vector3D::new(0.1, 1.0, 0.3), 0.7),
            Vector3D::new(0.2, 1.3, -0.4),
        ));
        poses.write().stage = Some(Matrix4::from_translation(Vector3D::new(0.0, -1.1, 0.0)));
        let head = CoordinateSystem::new(poses.clone(), CoordinateSystemType::HeadModel);
        let stage = CoordinateSystem::new(poses.clone(), CoordinateSystemType::Stage);
        (poses, head, stage)
    }

    #[test]
    fn test_round_trip_is_identity() {
        let (_, head, stage) = systems();
        let there = head.transform_to(&stage).unwrap();
        let back = stage.transform_to(&head).unwrap();
        assert!(there.multiply(&back).approx_eq(&Matrix4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_stage_composes_relative_offset() {
        let (_, _, stage) = systems();
        stage.set_relative_matrix(Matrix4::from_translation(Vector3D::new(1.0, 0.0, 0.0)));
        let pose = stage.current_pose_matrix().unwrap();
        assert_eq!(pose.translation(), Vector3D::new(1.0, -1.1, 0.0));
    }

    #[test]
    fn test_missing_stage_is_unavailable() {
        let (poses, head, stage) = systems();
        poses.write().stage = None;
        assert!(matches!(
            stage.current_pose_matrix(),
            Err(XrError::FrameOfReferenceUnavailable(CoordinateSystemType::Stage))
        ));
        assert!(head.transform_to(&stage).is_none());
    }

    #[test]
    fn test_geospatial_is_unknown() {
        let (_, head, _) = systems();
        let geo = head.sibling(CoordinateSystemType::Geospatial);
        assert!(matches!(
            geo.current_pose_matrix(),
            Err(XrError::UnknownCoordinateSystemType(_))
        ));
        assert!(geo.transform_to(&head).is_none());
        assert!(head.transform_to(&geo).is_none());
    }

    #[test]
    fn test_clones_share_relative_offset() {
        let (poses, _, _) = systems();
        let tracker = CoordinateSystem::new(poses, CoordinateSystemType::Tracker);
        let clone = tracker.clone();
        tracker.set_relative_matrix(Matrix4::from_translation(Vector3D::new(0.0, 0.0, -2.0)));
        assert_eq!(clone.current_pose_matrix().unwrap().translation().z, -2.0);
        assert!(clone.ptr_eq(&tracker));
    }

    #[test]
    fn test_different_displays_have_no_transform() {
        let (_, head, _) = systems();
        let other = CoordinateSystem::new(DevicePoses::seated(1.1).shared(), CoordinateSystemType::Tracker);
        assert!(head.transform_to(&other).is_none());
    }
}
