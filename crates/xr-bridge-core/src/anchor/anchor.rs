//! Anchors: stable references to real or virtual points

use crate::coordinates::CoordinateSystem;
use crate::error::Result;
use crate::math::{Matrix4, Vector3D};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Anchor identifier, unique within the Reality that created it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    /// Mint a new time-ordered id
    pub fn generate() -> Self {
        Self(format!("anchor-{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AnchorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Orientation of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneAlignment {
    Horizontal,
    Vertical,
}

/// Mesh reported for a tracked face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceGeometry {
    /// Flattened `[x, y, z]` vertex positions in the anchor's frame
    #[serde(default)]
    pub vertices: Vec<f32>,
    #[serde(default)]
    pub triangle_indices: Vec<u32>,
    #[serde(default)]
    pub blend_shapes: HashMap<String, f32>,
}

/// Variant-specific anchor data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnchorPayload {
    /// Free-floating point
    Plain,
    /// Detected surface
    Plane {
        center: Vector3D,
        /// Width (x) and length (z) in meters
        extent: [f32; 2],
        alignment: PlaneAlignment,
    },
    Face {
        geometry: FaceGeometry,
    },
    /// Recognised reference image
    Image {
        name: String,
        physical_width: f32,
    },
}

impl AnchorPayload {
    pub fn is_plane(&self) -> bool {
        matches!(self, AnchorPayload::Plane { .. })
    }
}

#[derive(Debug)]
struct AnchorInner {
    id: AnchorId,
    coordinate_system: CoordinateSystem,
    payload: RwLock<AnchorPayload>,
}

/// Shared handle to an anchor.
///
/// Tracking updates mutate the anchor in place: every handle keeps the same
/// id and identity and observes the refined pose.
#[derive(Debug, Clone)]
pub struct Anchor(Arc<AnchorInner>);

impl Anchor {
    pub(crate) fn new(id: AnchorId, coordinate_system: CoordinateSystem, payload: AnchorPayload) -> Self {
        Self(Arc::new(AnchorInner {
            id,
            coordinate_system,
            payload: RwLock::new(payload),
        }))
    }

    pub fn id(&self) -> &AnchorId {
        &self.0.id
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.0.coordinate_system
    }

    pub fn payload(&self) -> AnchorPayload {
        self.0.payload.read().clone()
    }

    /// Current pose in the tracker frame
    pub fn pose_matrix(&self) -> Result<Matrix4> {
        self.0.coordinate_system.current_pose_matrix()
    }

    /// Whether two handles refer to the same anchor object
    pub fn ptr_eq(&self, other: &Anchor) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Overwrite the pose (and optionally the payload) in place
    pub(crate) fn apply_update(&self, transform: Matrix4, payload: Option<AnchorPayload>) {
        self.0.coordinate_system.set_relative_matrix(transform);
        if let Some(payload) = payload {
            *self.0.payload.write() = payload;
        }
    }
}
