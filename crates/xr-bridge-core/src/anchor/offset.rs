//! A pose expressed relative to an anchor

use super::{Anchor, AnchorId};
use crate::coordinates::{CoordinateSystemType, Coordinates};
use crate::math::Matrix4;

/// What a hit test resolves to: an anchor plus an offset from it
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorOffset {
    pub anchor_id: AnchorId,
    pub offset: Matrix4,
}

impl AnchorOffset {
    pub fn new(anchor_id: AnchorId, offset: Matrix4) -> Self {
        Self { anchor_id, offset }
    }

    /// Zero offset: the anchor's own pose
    pub fn at_anchor(anchor_id: AnchorId) -> Self {
        Self::new(anchor_id, Matrix4::IDENTITY)
    }

    /// The offset pose in the tracker frame, following the anchor as it is updated
    pub fn offset_transform(&self, anchor: &Anchor) -> Option<Matrix4> {
        if anchor.id() != &self.anchor_id {
            return None;
        }
        let anchor_pose = anchor.pose_matrix().ok()?;
        Some(anchor_pose.multiply(&self.offset))
    }

    /// The offset pose as tracker-frame coordinates
    pub fn coordinates(&self, anchor: &Anchor) -> Option<Coordinates> {
        let pose = self.offset_transform(anchor)?;
        let tracker = anchor.coordinate_system().sibling(CoordinateSystemType::Tracker);
        Some(Coordinates::from_matrix(tracker, pose))
    }
}
