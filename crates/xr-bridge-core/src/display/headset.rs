//! Head-mounted display backed by a WebVR-class pose source

use super::{
    DisplayBackend, DisplayCapabilities, DisplayConfig, DisplayKind, Eye, StageBounds, View,
    Viewport,
};
use crate::coordinates::DevicePoses;
use crate::error::Result;
use crate::math::{matrix, Matrix4, Quaternion, Vector3D};

/// Latest pose reported by the headset, in its sitting space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadsetPose {
    pub orientation: Option<Quaternion>,
    pub position: Option<Vector3D>,
}

/// Per-edge field of view in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub up: f32,
    pub down: f32,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeParameters {
    pub field_of_view: FieldOfView,
    /// Eye position relative to the head
    pub offset: Vector3D,
}

/// Room-scale data, when the headset has it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParameters {
    /// Maps sitting space into standing (floor-origin) space
    pub sitting_to_standing: Matrix4,
    pub size_x: f32,
    pub size_z: f32,
}

/// Hardware interface of a head-mounted display
pub trait HeadsetSource: Send {
    /// `None` when the headset lost tracking this frame
    fn pose(&mut self) -> Option<HeadsetPose>;

    fn eye_parameters(&self, eye: Eye) -> EyeParameters;

    fn stage_parameters(&self) -> Option<StageParameters>;

    fn has_position(&self) -> bool;

    fn submit_frame(&mut self) -> Result<()>;
}

/// Stereo display over a [`HeadsetSource`].
///
/// The tracker frame is the headset's sitting space, whose origin is the
/// seated eye position; the stage is the inverse of the sitting-to-standing
/// transform. A frame without a pose keeps the last known head pose.
pub struct HeadsetBackend<S> {
    source: S,
}

impl<S: HeadsetSource> HeadsetBackend<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: HeadsetSource> DisplayBackend for HeadsetBackend<S> {
    fn kind(&self) -> DisplayKind {
        DisplayKind::Headset
    }

    fn capabilities(&self) -> DisplayCapabilities {
        DisplayCapabilities {
            can_present_exclusive: true,
            has_position: self.source.has_position(),
            stereo: true,
        }
    }

    fn update_poses(&mut self, poses: &mut DevicePoses, _config: &DisplayConfig) -> Result<()> {
        poses.tracker = Matrix4::IDENTITY;
        poses.eye_level = Some(Matrix4::IDENTITY);
        poses.stage = self
            .source
            .stage_parameters()
            .map(|stage| stage.sitting_to_standing.inverse_or_identity());

        if let Some(pose) = self.source.pose() {
            poses.head = Some(Matrix4::from_rotation_translation(
                pose.orientation.unwrap_or(Quaternion::IDENTITY).normalize(),
                pose.position.unwrap_or(Vector3D::ZERO),
            ));
        }
        Ok(())
    }

    fn views(&self, config: &DisplayConfig) -> Vec<View> {
        [Eye::Left, Eye::Right]
            .into_iter()
            .map(|eye| {
                let fov = self.source.eye_parameters(eye).field_of_view;
                let mut projection = [0.0; 16];
                matrix::from_field_of_view(
                    &mut projection,
                    fov.up,
                    fov.down,
                    fov.left,
                    fov.right,
                    config.depth_near,
                    config.depth_far,
                );
                View {
                    eye,
                    projection: Matrix4(projection),
                    viewport: Viewport::for_eye(eye),
                }
            })
            .collect()
    }

    fn submit_frame(&mut self) -> Result<()> {
        self.source.submit_frame()
    }

    fn stage_bounds(&self) -> Option<StageBounds> {
        let stage = self.source.stage_parameters()?;
        (stage.size_x > 0.0 && stage.size_z > 0.0).then_some(StageBounds {
            width: stage.size_x,
            depth: stage.size_z,
        })
    }
}
