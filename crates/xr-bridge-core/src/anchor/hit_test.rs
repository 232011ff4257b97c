//! Hit-test candidates and the tie-break that picks one

use super::AnchorId;
use crate::math::Matrix4;

/// Surface categories a backend may report for a screen point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitTestType {
    FeaturePoint,
    EstimatedHorizontalPlane,
    EstimatedVerticalPlane,
    ExistingPlane,
    ExistingPlaneUsingExtent,
    ExistingPlaneUsingGeometry,
}

impl HitTestType {
    pub const ALL: [HitTestType; 6] = [
        HitTestType::FeaturePoint,
        HitTestType::EstimatedHorizontalPlane,
        HitTestType::EstimatedVerticalPlane,
        HitTestType::ExistingPlane,
        HitTestType::ExistingPlaneUsingExtent,
        HitTestType::ExistingPlaneUsingGeometry,
    ];

    /// Bit used by the native bridge's type mask
    pub fn bit(self) -> u32 {
        match self {
            HitTestType::FeaturePoint => 1,
            HitTestType::EstimatedHorizontalPlane => 2,
            HitTestType::EstimatedVerticalPlane => 4,
            HitTestType::ExistingPlane => 8,
            HitTestType::ExistingPlaneUsingExtent => 16,
            HitTestType::ExistingPlaneUsingGeometry => 32,
        }
    }

    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.bit() == bit)
    }

    /// Lower tiers win regardless of distance
    fn tier(self) -> u8 {
        match self {
            HitTestType::ExistingPlaneUsingExtent => 0,
            HitTestType::ExistingPlane | HitTestType::ExistingPlaneUsingGeometry => 1,
            HitTestType::EstimatedHorizontalPlane | HitTestType::EstimatedVerticalPlane => 2,
            HitTestType::FeaturePoint => 3,
        }
    }

    /// Mask covering every type
    pub fn all_mask() -> u32 {
        Self::ALL.iter().fold(0, |mask, t| mask | t.bit())
    }
}

/// One candidate surface under a screen point
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub hit_type: HitTestType,
    /// Distance from the viewer in meters
    pub distance: f32,
    /// Hit pose in the tracker frame
    pub world_transform: Matrix4,
    /// Existing anchor the hit lies on, if any
    pub anchor_id: Option<AnchorId>,
}

/// Choose the best candidate: extent-matched planes, then other existing
/// planes, then estimated surfaces, then feature points; nearest within a tier.
pub fn pick_best_hit(hits: &[HitResult]) -> Option<&HitResult> {
    hits.iter().min_by(|a, b| {
        a.hit_type
            .tier()
            .cmp(&b.hit_type.tier())
            .then_with(|| a.distance.total_cmp(&b.distance))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(hit_type: HitTestType, distance: f32) -> HitResult {
        HitResult {
            hit_type,
            distance,
            world_transform: Matrix4::IDENTITY,
            anchor_id: None,
        }
    }

    #[test]
    fn test_extent_beats_closer_plane() {
        let hits = vec![
            hit(HitTestType::ExistingPlane, 0.5),
            hit(HitTestType::ExistingPlaneUsingExtent, 3.0),
        ];
        assert_eq!(
            pick_best_hit(&hits).unwrap().hit_type,
            HitTestType::ExistingPlaneUsingExtent
        );
    }

    #[test]
    fn test_tier_order() {
        let hits = vec![
            hit(HitTestType::FeaturePoint, 0.1),
            hit(HitTestType::EstimatedHorizontalPlane, 2.0),
            hit(HitTestType::ExistingPlane, 4.0),
        ];
        assert_eq!(pick_best_hit(&hits).unwrap().hit_type, HitTestType::ExistingPlane);

        let hits = vec![
            hit(HitTestType::FeaturePoint, 0.1),
            hit(HitTestType::EstimatedVerticalPlane, 2.0),
        ];
        assert_eq!(
            pick_best_hit(&hits).unwrap().hit_type,
            HitTestType::EstimatedVerticalPlane
        );
    }

    #[test]
    fn test_nearest_within_tier() {
        let hits = vec![
            hit(HitTestType::FeaturePoint, 1.5),
            hit(HitTestType::FeaturePoint, 0.7),
            hit(HitTestType::FeaturePoint, 0.9),
        ];
        assert_eq!(pick_best_hit(&hits).unwrap().distance, 0.7);
    }

    #[test]
    fn test_empty() {
        assert!(pick_best_hit(&[]).is_none());
    }

    #[test]
    fn test_bits() {
        assert_eq!(HitTestType::from_bit(16), Some(HitTestType::ExistingPlaneUsingExtent));
        assert_eq!(HitTestType::from_bit(3), None);
        assert_eq!(HitTestType::all_mask(), 63);
    }
}
