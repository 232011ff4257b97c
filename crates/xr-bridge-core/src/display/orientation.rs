//! Device-orientation sensor display (no positional tracking)

use super::{DisplayBackend, DisplayCapabilities, DisplayConfig, DisplayKind, View};
use crate::coordinates::DevicePoses;
use crate::error::Result;
use crate::math::{Matrix4, Quaternion, Vector3D};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

/// One orientation sample, all angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationReading {
    /// Rotation about the vertical axis
    pub alpha: f32,
    /// Front-to-back tilt; 90 holds the device upright
    pub beta: f32,
    /// Left-to-right tilt
    pub gamma: f32,
    /// Screen rotation relative to the device's natural orientation
    #[serde(default)]
    pub screen_orientation: f32,
}

impl OrientationReading {
    /// Camera orientation for this reading: looking down -Z when the device
    /// is held upright facing alpha = 0.
    pub fn quaternion(&self) -> Quaternion {
        let device = Quaternion::from_euler_yxz(
            self.beta.to_radians(),
            self.alpha.to_radians(),
            (-self.gamma).to_radians(),
        );
        // Rotate from looking out of the screen to looking out of the back
        let camera = Quaternion::new(-FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let screen = Quaternion::from_axis_angle(
            Vector3D::new(0.0, 0.0, 1.0),
            (-self.screen_orientation).to_radians(),
        );
        device * camera * screen
    }
}

/// Producer side of an orientation backend; clone it into the sensor callback
#[derive(Debug, Clone, Default)]
pub struct OrientationFeed(Arc<Mutex<Option<OrientationReading>>>);

impl OrientationFeed {
    pub fn push(&self, reading: OrientationReading) {
        *self.0.lock() = Some(reading);
    }

    pub fn latest(&self) -> Option<OrientationReading> {
        *self.0.lock()
    }
}

/// Orientation-only display: the head sits at the seated eye height above a
/// floor-origin tracker frame and only rotates
#[derive(Debug)]
pub struct OrientationBackend {
    feed: OrientationFeed,
}

impl OrientationBackend {
    pub fn new() -> (Self, OrientationFeed) {
        let feed = OrientationFeed::default();
        (Self::with_feed(feed.clone()), feed)
    }

    pub fn with_feed(feed: OrientationFeed) -> Self {
        Self { feed }
    }
}

impl DisplayBackend for OrientationBackend {
    fn kind(&self) -> DisplayKind {
        DisplayKind::Orientation
    }

    fn capabilities(&self) -> DisplayCapabilities {
        DisplayCapabilities::default()
    }

    fn update_poses(&mut self, poses: &mut DevicePoses, config: &DisplayConfig) -> Result<()> {
        let eye = config.seated_eye();
        poses.tracker = Matrix4::IDENTITY;
        poses.eye_level = Some(eye);

        match self.feed.latest() {
            Some(reading) => {
                poses.head = Some(Matrix4::from_rotation_translation(
                    reading.quaternion(),
                    eye.translation(),
                ));
                poses.stage = Some(Matrix4::IDENTITY);
            }
            None => {
                poses.head = Some(eye);
                poses.stage = None;
            }
        }
        Ok(())
    }

    fn views(&self, config: &DisplayConfig) -> Vec<View> {
        vec![View::mono(config.projection().matrix())]
    }
}
