//! Anchors, anchor offsets and hit-test selection

#[allow(clippy::module_inception)]
mod anchor;
mod hit_test;
mod offset;

pub use anchor::{Anchor, AnchorId, AnchorPayload, FaceGeometry, PlaneAlignment};
pub use hit_test::{pick_best_hit, HitResult, HitTestType};
pub use offset::AnchorOffset;
