//! Off-thread analysis boundary
//!
//! Camera frames leave the core as serialized [`WorkerFrame`]s; results come
//! back as [`WorkerResult`]s stamped with the originating frame's timestamp.
//! [`PoseHistory`] keeps recent head poses so a late result is placed with
//! the pose its frame was captured at.

use crate::coordinates::CoordinateSystemType;
use crate::error::{Result, XrError};
use crate::frame::PresentationFrame;
use crate::math::Matrix4;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Luminance8,
    /// Full-resolution luma plane followed by quarter-resolution chroma
    Yuv420Planar,
}

impl PixelFormat {
    /// Minimum buffer length for a frame of this format
    pub fn required_len(self, width: u32, height: u32, row_stride: u32) -> usize {
        let rows = height as usize;
        let stride = row_stride as usize;
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::Luminance8 => stride * rows,
            PixelFormat::Yuv420Planar => {
                stride * rows + 2 * ((width as usize).div_ceil(2) * rows.div_ceil(2))
            }
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Luminance8 | PixelFormat::Yuv420Planar => 1,
        }
    }
}

/// Pinhole camera intrinsics in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

/// A camera frame serialized for a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFrame {
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub format: PixelFormat,
    /// Base64-encoded pixel data
    pub pixels: String,
    pub intrinsics: CameraIntrinsics,
    /// Camera pose in the tracker frame when the image was captured
    pub camera_pose: Matrix4,
}

impl WorkerFrame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: f64,
        width: u32,
        height: u32,
        row_stride: u32,
        format: PixelFormat,
        pixels: &[u8],
        intrinsics: CameraIntrinsics,
        camera_pose: Matrix4,
    ) -> Result<Self> {
        if (row_stride as usize) < width as usize * format.bytes_per_pixel() {
            return Err(XrError::InvalidFrameBuffer(format!(
                "row stride {row_stride} is shorter than a {width} pixel row"
            )));
        }
        let required = format.required_len(width, height, row_stride);
        if pixels.len() < required {
            return Err(XrError::InvalidFrameBuffer(format!(
                "{} bytes supplied, {required} required",
                pixels.len()
            )));
        }

        Ok(Self {
            timestamp,
            width,
            height,
            row_stride,
            format,
            pixels: STANDARD.encode(pixels),
            intrinsics,
            camera_pose,
        })
    }

    /// Package `pixels` with the frame's timestamp and tracker-frame head pose
    pub fn from_frame(
        frame: &PresentationFrame<'_>,
        width: u32,
        height: u32,
        row_stride: u32,
        format: PixelFormat,
        pixels: &[u8],
        intrinsics: CameraIntrinsics,
    ) -> Result<Self> {
        let tracker = frame
            .session()
            .display()
            .coordinate_system(CoordinateSystemType::Tracker);
        let camera_pose = frame
            .get_pose(&tracker)
            .ok_or(XrError::FrameOfReferenceUnavailable(CoordinateSystemType::HeadModel))?
            .pose_matrix();
        Self::new(
            frame.timestamp(),
            width,
            height,
            row_stride,
            format,
            pixels,
            intrinsics,
            camera_pose,
        )
    }

    pub fn decode_pixels(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.pixels)
            .map_err(|e| XrError::InvalidFrameBuffer(e.to_string()))
    }
}

/// Something a worker found, posed relative to the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub camera_transform: Matrix4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Timestamp of the [`WorkerFrame`] the detections came from
    pub timestamp: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// A detection placed in the tracker frame
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDetection {
    pub label: String,
    pub transform: Matrix4,
}

/// Most poses a [`PoseHistory`] keeps, a minute at 60 Hz
pub const MAX_POSE_HISTORY: usize = 3600;

/// Bounded, time-ordered record of head poses
#[derive(Debug, Clone)]
pub struct PoseHistory {
    capacity: usize,
    entries: VecDeque<(f64, Matrix4)>,
}

impl PoseHistory {
    /// `capacity` is clamped to `1..=MAX_POSE_HISTORY`
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(1, MAX_POSE_HISTORY);
        if clamped != capacity {
            tracing::warn!(requested = capacity, used = clamped, "pose history capacity clamped");
        }
        Self {
            capacity: clamped,
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the pose for `timestamp`; out-of-order timestamps are ignored
    pub fn record(&mut self, timestamp: f64, pose: Matrix4) {
        match self.entries.back_mut() {
            Some((last, _)) if timestamp < *last => return,
            Some((last, last_pose)) if timestamp == *last => {
                *last_pose = pose;
                return;
            }
            _ => {}
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((timestamp, pose));
    }

    /// Latest pose recorded at or before `timestamp`
    pub fn pose_at(&self, timestamp: f64) -> Option<Matrix4> {
        let index = self.entries.partition_point(|(t, _)| *t <= timestamp);
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|(_, pose)| *pose)
    }

    /// Place every detection using the pose at the result's timestamp
    pub fn resolve(&self, result: &WorkerResult) -> Option<Vec<ResolvedDetection>> {
        let pose = self.pose_at(result.timestamp)?;
        Some(
            result
                .detections
                .iter()
                .map(|detection| ResolvedDetection {
                    label: detection.label.clone(),
                    transform: pose.multiply(&detection.camera_transform),
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3D;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 2.0,
            cy: 1.0,
        }
    }

    #[test]
    fn test_frame_pixels_survive_serialization() {
        let pixels: Vec<u8> = (0..32).collect();
        let frame = WorkerFrame::new(
            16.0,
            4,
            2,
            16,
            PixelFormat::Rgba8,
            &pixels,
            intrinsics(),
            Matrix4::IDENTITY,
        )
        .unwrap();

        let json = serde_json::to_string(&frame).unwrap();
        let back: WorkerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decode_pixels().unwrap(), pixels);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let result = WorkerFrame::new(
            0.0,
            4,
            2,
            4,
            PixelFormat::Luminance8,
            &[0; 7],
            intrinsics(),
            Matrix4::IDENTITY,
        );
        assert!(matches!(result, Err(XrError::InvalidFrameBuffer(_))));

        let result = WorkerFrame::new(
            0.0,
            4,
            2,
            8,
            PixelFormat::Rgba8,
            &[0; 64],
            intrinsics(),
            Matrix4::IDENTITY,
        );
        assert!(matches!(result, Err(XrError::InvalidFrameBuffer(_))));
    }

    #[test]
    fn test_pose_history_capacity_is_bounded() {
        assert_eq!(PoseHistory::new(0).capacity(), 1);
        assert_eq!(PoseHistory::new(usize::MAX).capacity(), MAX_POSE_HISTORY);

        let mut history = PoseHistory::new(usize::MAX);
        for i in 0..MAX_POSE_HISTORY + 10 {
            history.record(i as f64, Matrix4::IDENTITY);
        }
        assert!(history.pose_at(9.0).is_none());
        assert!(history.pose_at(10.0).is_some());
    }

    #[test]
    fn test_pose_history_lookup() {
        let mut history = PoseHistory::new(3);
        for (i, t) in [10.0, 20.0, 30.0, 40.0].into_iter().enumerate() {
            history.record(t, Matrix4::from_translation(Vector3D::new(i as f32, 0.0, 0.0)));
        }
        history.record(5.0, Matrix4::IDENTITY);

        assert_eq!(history.len(), 3);
        assert!(history.pose_at(15.0).is_none());
        assert_eq!(history.pose_at(25.0).unwrap().translation().x, 1.0);
        assert_eq!(history.pose_at(99.0).unwrap().translation().x, 3.0);
    }

    #[test]
    fn test_resolve_uses_pose_at_result_time() {
        let mut history = PoseHistory::new(8);
        history.record(0.0, Matrix4::from_translation(Vector3D::new(0.0, 1.1, 0.0)));
        history.record(16.0, Matrix4::from_translation(Vector3D::new(5.0, 1.1, 0.0)));

        let result = WorkerResult {
            timestamp: 0.0,
            detections: vec![Detection {
                label: "marker-3".into(),
                camera_transform: Matrix4::from_translation(Vector3D::new(0.0, 0.0, -2.0)),
            }],
        };
        let resolved = history.resolve(&result).unwrap();
        assert_eq!(resolved[0].transform.translation(), Vector3D::new(0.0, 1.1, -2.0));

        assert!(history
            .resolve(&WorkerResult {
                timestamp: -1.0,
                detections: vec![]
            })
            .is_none());
    }
}
