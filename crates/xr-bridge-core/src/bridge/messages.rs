//! Wire messages exchanged with a native AR bridge

use crate::anchor::{AnchorId, AnchorPayload, HitResult, HitTestType};
use crate::math::Matrix4;
use serde::{Deserialize, Serialize};

/// Options sent with `initialize`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializeOptions {
    #[serde(default)]
    pub ui: bool,
    #[serde(default)]
    pub location: bool,
}

/// Which streams the bridge should include in watch updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
    #[serde(default = "default_true")]
    pub camera: bool,
    #[serde(default = "default_true")]
    pub anchors: bool,
    #[serde(default)]
    pub planes: bool,
    #[serde(default)]
    pub light_estimate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            camera: true,
            anchors: true,
            planes: true,
            light_estimate: true,
        }
    }
}

/// Requests the core issues to the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BridgeRequest {
    Initialize { options: InitializeOptions },
    HitTest { x: f32, y: f32, types: u32 },
    AddAnchor { id: AnchorId, transform: Matrix4 },
    RemoveAnchor { id: AnchorId },
    Watch { options: WatchOptions },
    Stop,
}

/// A request stamped with its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub correlation_id: String,
    #[serde(flatten)]
    pub request: BridgeRequest,
}

/// Messages arriving from the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncomingMessage {
    Reply {
        correlation_id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    Failure {
        correlation_id: String,
        message: String,
    },
    Watch {
        update: WatchUpdate,
    },
}

/// Reply to `initialize`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Reply to `add_anchor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedAnchor {
    pub id: AnchorId,
    pub transform: Matrix4,
}

/// One hit as the bridge reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeHit {
    #[serde(rename = "type")]
    pub hit_type: u32,
    pub distance: f32,
    pub world_transform: Matrix4,
    #[serde(default)]
    pub anchor_id: Option<AnchorId>,
}

impl BridgeHit {
    /// `None` for type bits this core does not know
    pub fn into_hit_result(self) -> Option<HitResult> {
        Some(HitResult {
            hit_type: HitTestType::from_bit(self.hit_type)?,
            distance: self.distance,
            world_transform: self.world_transform,
            anchor_id: self.anchor_id,
        })
    }
}

/// Camera state for one bridge frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraUpdate {
    pub transform: Matrix4,
    pub projection: Matrix4,
}

/// Anchor state for one bridge frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeAnchor {
    pub id: AnchorId,
    pub transform: Matrix4,
    #[serde(default)]
    pub payload: Option<AnchorPayload>,
}

/// Payload of the streaming watch channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchUpdate {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub camera: Option<CameraUpdate>,
    #[serde(default)]
    pub anchors: Vec<BridgeAnchor>,
    #[serde(default)]
    pub removed_anchors: Vec<AnchorId>,
    #[serde(default)]
    pub light_intensity: Option<f32>,
}
