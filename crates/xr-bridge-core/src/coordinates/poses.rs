//! Device-owned pose store read by every coordinate system

use crate::math::{Matrix4, Vector3D};
use parking_lot::RwLock;
use std::sync::Arc;

/// Sitting eye height above the floor, in meters
pub const SITTING_EYE_HEIGHT: f32 = 1.1;

/// Standing eye height above the floor, in meters
pub const STANDING_EYE_HEIGHT: f32 = 1.65;

/// The latest poses a display has produced, all expressed in the tracker frame.
///
/// `None` means the backend has not produced a first fix for that pose yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePoses {
    pub head: Option<Matrix4>,
    pub eye_level: Option<Matrix4>,
    pub stage: Option<Matrix4>,
    pub tracker: Matrix4,
}

/// Shared handle to a display's pose store
pub type SharedPoses = Arc<RwLock<DevicePoses>>;

impl DevicePoses {
    /// Head and eye level at `eye_height` above the tracker origin, stage unknown
    pub fn seated(eye_height: f32) -> Self {
        let eye = Matrix4::from_translation(Vector3D::new(0.0, eye_height, 0.0));
        Self {
            head: Some(eye),
            eye_level: Some(eye),
            stage: None,
            tracker: Matrix4::IDENTITY,
        }
    }

    /// Nothing known yet
    pub fn empty() -> Self {
        Self {
            head: None,
            eye_level: None,
            stage: None,
            tracker: Matrix4::IDENTITY,
        }
    }

    pub fn shared(self) -> SharedPoses {
        Arc::new(RwLock::new(self))
    }

    /// Replace any non-finite matrix with identity; returns how many were replaced
    pub fn sanitize(&mut self) -> usize {
        let mut replaced = 0;
        for slot in [&mut self.head, &mut self.eye_level, &mut self.stage] {
            if let Some(m) = slot {
                if !m.is_finite() {
                    *m = Matrix4::IDENTITY;
                    replaced += 1;
                }
            }
        }
        if !self.tracker.is_finite() {
            self.tracker = Matrix4::IDENTITY;
            replaced += 1;
        }
        replaced
    }
}

impl Default for DevicePoses {
    fn default() -> Self {
        Self::seated(SITTING_EYE_HEIGHT)
    }
}
