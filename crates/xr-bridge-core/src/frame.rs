//! The per-tick view handed to frame callbacks

use crate::anchor::{Anchor, AnchorId};
use crate::coordinates::{CoordinateSystem, CoordinateSystemType, Coordinates};
use crate::display::{StageBounds, View};
use crate::error::{Result, XrError};
use crate::math::Matrix4;
use crate::session::Session;
use std::cell::Cell;

/// Snapshot of a session, its display and its reality at one tick.
///
/// Borrowed for the duration of the callback only; poses read through it
/// reflect the shared pose store, which the next tick overwrites.
pub struct PresentationFrame<'a> {
    session: &'a Session,
    timestamp: f64,
    views: Vec<View>,
    reference_failure: Cell<Option<CoordinateSystemType>>,
}

impl<'a> PresentationFrame<'a> {
    pub(crate) fn new(session: &'a Session, timestamp: f64) -> Self {
        Self {
            session,
            timestamp,
            views: session.display().views(),
            reference_failure: Cell::new(None),
        }
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    /// Frame time in milliseconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Render viewpoints: two for stereo, one otherwise
    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// The first of `kinds` the display can produce right now.
    ///
    /// When none is available the frame is invalidated: the error is
    /// structural, poses and anchors read through this frame come back
    /// `None`, and the frame loop stops after this callback returns.
    pub fn coordinate_system(&self, kinds: &[CoordinateSystemType]) -> Result<CoordinateSystem> {
        let display = self.session.display();
        let found = kinds
            .iter()
            .map(|kind| display.coordinate_system(*kind))
            .find(|system| system.current_pose_matrix().is_ok());

        match found {
            Some(system) => Ok(system),
            None => {
                let missing = kinds
                    .first()
                    .copied()
                    .unwrap_or(CoordinateSystemType::EyeLevel);
                if self.reference_failure.get().is_none() {
                    self.reference_failure.set(Some(missing));
                }
                Err(XrError::FrameOfReferenceUnavailable(missing))
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.reference_failure.get().is_none()
    }

    /// The viewer's head pose expressed in `coordinate_system`
    pub fn get_pose(&self, coordinate_system: &CoordinateSystem) -> Option<Coordinates> {
        if !self.is_valid() {
            return None;
        }
        let head = self
            .session
            .display()
            .coordinate_system(CoordinateSystemType::HeadModel);
        Coordinates::from_matrix(head, Matrix4::IDENTITY).transformed_to(coordinate_system)
    }

    pub fn get_anchor(&self, id: &AnchorId) -> Option<Anchor> {
        if !self.is_valid() {
            return None;
        }
        self.session.get_anchor(id)
    }

    pub fn add_anchor(&self, coordinates: &Coordinates) -> Result<Anchor> {
        self.session.add_anchor(coordinates)
    }

    pub fn remove_anchor(&self, id: &AnchorId) -> Result<()> {
        self.session.remove_anchor(id)
    }

    /// Ambient light intensity, if the reality estimates it
    pub fn light_estimate(&self) -> Option<f32> {
        self.session.reality().light_estimate()
    }

    pub fn stage_bounds(&self) -> Option<StageBounds> {
        self.session.display().stage_bounds()
    }

    pub(crate) fn reference_failure(&self) -> Option<CoordinateSystemType> {
        self.reference_failure.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Display, DisplayConfig, OrientationBackend};
    use crate::reality::{LocalRealityBackend, Reality};
    use crate::scheduler::ManualScheduler;
    use crate::session::{SessionConfig, SessionParameters};
    use std::sync::Arc;

    async fn session() -> Session {
        let (backend, _feed) = OrientationBackend::new();
        let display = Display::new(
            "flat",
            Box::new(backend),
            Arc::new(ManualScheduler::new()),
            Arc::new(Reality::camera("camera", Arc::new(LocalRealityBackend::new()))),
            DisplayConfig::default(),
        );
        display
            .request_session(SessionParameters::augmentation(), SessionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_coordinate_system_falls_back_in_order() {
        let session = session().await;
        let frame = PresentationFrame::new(&session, 0.0);

        // No orientation reading yet, so no stage
        let system = frame
            .coordinate_system(&[CoordinateSystemType::Stage, CoordinateSystemType::EyeLevel])
            .unwrap();
        assert_eq!(system.kind(), CoordinateSystemType::EyeLevel);
        assert!(frame.reference_failure().is_none());

        let err = frame
            .coordinate_system(&[CoordinateSystemType::Stage])
            .unwrap_err();
        assert!(err.is_structural());
        assert_eq!(frame.reference_failure(), Some(CoordinateSystemType::Stage));
    }

    #[tokio::test]
    async fn test_invalidated_frame_serves_no_poses() {
        let session = session().await;
        let frame = PresentationFrame::new(&session, 0.0);
        let eye_level = session
            .display()
            .coordinate_system(CoordinateSystemType::EyeLevel);
        assert!(frame.get_pose(&eye_level).is_some());

        assert!(frame.coordinate_system(&[CoordinateSystemType::Stage]).is_err());
        assert!(frame.get_pose(&eye_level).is_none());
    }

    #[tokio::test]
    async fn test_get_pose_in_eye_level() {
        let session = session().await;
        let frame = PresentationFrame::new(&session, 0.0);
        let eye_level = frame
            .coordinate_system(&[CoordinateSystemType::EyeLevel])
            .unwrap();
        let pose = frame.get_pose(&eye_level).unwrap();
        assert!(pose.pose_matrix().approx_eq(&Matrix4::IDENTITY, 1e-6));
        assert_eq!(frame.views().len(), 1);
    }
}
