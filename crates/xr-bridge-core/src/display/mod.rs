//! Displays: adapt one tracking backend's poses into the shared pose store
//!
//! A [`Display`] owns the fixed coordinate systems (head, eye level, stage,
//! tracker), the backend that refreshes their poses once per tick, and the
//! shared reality augmentation sessions render against. Sessions are
//! negotiated through [`Display::request_session`].

mod headset;
mod native;
mod orientation;

pub use headset::{
    EyeParameters, FieldOfView, HeadsetBackend, HeadsetPose, HeadsetSource, StageParameters,
};
pub use native::{native_bridge_display, NativeBridgeBackend};
pub use orientation::{OrientationBackend, OrientationFeed, OrientationReading};

use crate::coordinates::{
    CoordinateSystem, CoordinateSystemType, DevicePoses, SharedPoses, SITTING_EYE_HEIGHT,
    STANDING_EYE_HEIGHT,
};
use crate::error::{Result, XrError};
use crate::events::{Event, EventRegistry};
use crate::math::{Matrix4, Projection, Vector3D};
use crate::reality::Reality;
use crate::scheduler::FrameScheduler;
use crate::session::{Session, SessionConfig, SessionKind, SessionParameters};
use parking_lot::Mutex;
use std::sync::Arc;

/// Display tuning shared by every backend
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub sitting_eye_height: f32,
    pub standing_eye_height: f32,
    pub field_of_view_degrees: f32,
    pub aspect: f32,
    pub depth_near: f32,
    pub depth_far: f32,
}

impl DisplayConfig {
    /// Projection for backends that do not report their own
    pub fn projection(&self) -> Projection {
        Projection::perspective(
            self.field_of_view_degrees,
            self.aspect,
            self.depth_near,
            self.depth_far,
        )
    }

    /// Eye-level pose above a floor-origin tracker frame
    pub fn seated_eye(&self) -> Matrix4 {
        Matrix4::from_translation(Vector3D::new(0.0, self.sitting_eye_height, 0.0))
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            sitting_eye_height: SITTING_EYE_HEIGHT,
            standing_eye_height: STANDING_EYE_HEIGHT,
            field_of_view_degrees: 70.0,
            aspect: 16.0 / 9.0,
            depth_near: 0.1,
            depth_far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    Orientation,
    NativeBridge,
    Headset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayCapabilities {
    /// Can run an exclusive (immersive) session
    pub can_present_exclusive: bool,
    pub has_position: bool,
    pub stereo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
    Mono,
}

/// Normalized region of the render surface (0..1, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const FULL: Viewport = Viewport {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn for_eye(eye: Eye) -> Self {
        match eye {
            Eye::Left => Viewport {
                width: 0.5,
                ..Self::FULL
            },
            Eye::Right => Viewport {
                x: 0.5,
                width: 0.5,
                ..Self::FULL
            },
            Eye::Mono => Self::FULL,
        }
    }
}

/// One render viewpoint
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub eye: Eye,
    pub projection: Matrix4,
    pub viewport: Viewport,
}

impl View {
    pub fn mono(projection: Matrix4) -> Self {
        Self {
            eye: Eye::Mono,
            projection,
            viewport: Viewport::FULL,
        }
    }
}

/// Rectangular play area centred on the stage origin, in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBounds {
    pub width: f32,
    pub depth: f32,
}

impl StageBounds {
    /// Floor corners in the stage frame, counter-clockwise seen from above
    pub fn corners(&self) -> [Vector3D; 4] {
        let (hx, hz) = (self.width / 2.0, self.depth / 2.0);
        [
            Vector3D::new(-hx, 0.0, -hz),
            Vector3D::new(-hx, 0.0, hz),
            Vector3D::new(hx, 0.0, hz),
            Vector3D::new(hx, 0.0, -hz),
        ]
    }
}

/// A tracking technology that produces device poses
pub trait DisplayBackend: Send {
    fn kind(&self) -> DisplayKind;

    fn capabilities(&self) -> DisplayCapabilities;

    /// Called when the first session starts
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the last session ends
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Refresh `poses` for the current tick
    fn update_poses(&mut self, poses: &mut DevicePoses, config: &DisplayConfig) -> Result<()>;

    fn views(&self, config: &DisplayConfig) -> Vec<View>;

    /// Post-render hardware step
    fn submit_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn stage_bounds(&self) -> Option<StageBounds> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    SessionStarted { session_id: String },
    SessionEnded { session_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayEventKind {
    SessionStarted,
    SessionEnded,
}

impl Event for DisplayEvent {
    type Kind = DisplayEventKind;

    fn kind(&self) -> DisplayEventKind {
        match self {
            DisplayEvent::SessionStarted { .. } => DisplayEventKind::SessionStarted,
            DisplayEvent::SessionEnded { .. } => DisplayEventKind::SessionEnded,
        }
    }
}

#[derive(Debug, Default)]
struct ActiveSessions {
    count: usize,
    exclusive: bool,
}

pub struct Display {
    name: String,
    config: DisplayConfig,
    poses: SharedPoses,
    backend: Mutex<Box<dyn DisplayBackend>>,
    scheduler: Arc<dyn FrameScheduler>,
    reality: Arc<Reality>,
    head_model: CoordinateSystem,
    eye_level: CoordinateSystem,
    stage: CoordinateSystem,
    tracker: CoordinateSystem,
    sessions: Mutex<ActiveSessions>,
    events: EventRegistry<DisplayEvent>,
}

impl Display {
    /// Build a display around `backend`; `reality` is the shared reality
    /// augmentation sessions attach to.
    pub fn new(
        name: impl Into<String>,
        mut backend: Box<dyn DisplayBackend>,
        scheduler: Arc<dyn FrameScheduler>,
        reality: Arc<Reality>,
        config: DisplayConfig,
    ) -> Arc<Self> {
        let name = name.into();
        let mut initial = DevicePoses::empty();
        if let Err(e) = backend.update_poses(&mut initial, &config) {
            tracing::warn!(display = %name, error = %e, "initial pose update failed");
        }
        initial.sanitize();
        let poses = initial.shared();

        Arc::new(Self {
            head_model: CoordinateSystem::new(poses.clone(), CoordinateSystemType::HeadModel),
            eye_level: CoordinateSystem::new(poses.clone(), CoordinateSystemType::EyeLevel),
            stage: CoordinateSystem::new(poses.clone(), CoordinateSystemType::Stage),
            tracker: CoordinateSystem::new(poses.clone(), CoordinateSystemType::Tracker),
            name,
            config,
            poses,
            backend: Mutex::new(backend),
            scheduler,
            reality,
            sessions: Mutex::new(ActiveSessions::default()),
            events: EventRegistry::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn kind(&self) -> DisplayKind {
        self.backend.lock().kind()
    }

    pub fn capabilities(&self) -> DisplayCapabilities {
        self.backend.lock().capabilities()
    }

    pub fn poses(&self) -> &SharedPoses {
        &self.poses
    }

    pub fn scheduler(&self) -> &Arc<dyn FrameScheduler> {
        &self.scheduler
    }

    /// The shared reality
    pub fn reality(&self) -> &Arc<Reality> {
        &self.reality
    }

    pub fn events(&self) -> &EventRegistry<DisplayEvent> {
        &self.events
    }

    /// The display's system of `kind`; fixed kinds always return the same one
    pub fn coordinate_system(&self, kind: CoordinateSystemType) -> CoordinateSystem {
        match kind {
            CoordinateSystemType::HeadModel => self.head_model.clone(),
            CoordinateSystemType::EyeLevel => self.eye_level.clone(),
            CoordinateSystemType::Stage => self.stage.clone(),
            CoordinateSystemType::Tracker => self.tracker.clone(),
            CoordinateSystemType::Geospatial => self.tracker.sibling(kind),
        }
    }

    pub fn head_pose(&self) -> Option<Matrix4> {
        self.poses.read().head
    }

    pub fn views(&self) -> Vec<View> {
        self.backend.lock().views(&self.config)
    }

    pub fn stage_bounds(&self) -> Option<StageBounds> {
        self.backend.lock().stage_bounds()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().count
    }

    /// Negotiate a session.
    ///
    /// Augmentation sessions attach to the shared pass-through reality.
    /// Reality sessions must be exclusive, need an exclusive-capable backend,
    /// and get a private virtual reality. At most one exclusive session runs
    /// at a time.
    pub async fn request_session(
        self: &Arc<Self>,
        parameters: SessionParameters,
        config: SessionConfig,
    ) -> Result<Session> {
        let capabilities = self.capabilities();
        if parameters.exclusive && !capabilities.can_present_exclusive {
            return Err(XrError::CapabilityMismatch(format!(
                "display {} cannot present exclusively",
                self.name
            )));
        }

        let reality = match parameters.kind {
            SessionKind::Augmentation => {
                if !self.reality.is_passthrough() {
                    return Err(XrError::CapabilityMismatch(format!(
                        "display {} has no pass-through reality",
                        self.name
                    )));
                }
                self.reality.clone()
            }
            SessionKind::Reality => {
                if !parameters.exclusive {
                    return Err(XrError::CapabilityMismatch(
                        "reality sessions must be exclusive".into(),
                    ));
                }
                Arc::new(Reality::virtual_space(format!("{}-virtual", self.name)))
            }
        };

        self.reserve(parameters.exclusive)?;
        if let Err(e) = reality.attach_session() {
            self.release(parameters.exclusive);
            return Err(e);
        }

        let session = Session::new(self.clone(), reality, parameters, config);
        tracing::info!(display = %self.name, session = %session.id(), kind = ?parameters.kind, exclusive = parameters.exclusive, "session started");
        self.events.publish(&DisplayEvent::SessionStarted {
            session_id: session.id().to_string(),
        });
        Ok(session)
    }

    fn reserve(&self, exclusive: bool) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if exclusive && sessions.exclusive {
            return Err(XrError::CapabilityMismatch(format!(
                "display {} already has an exclusive session",
                self.name
            )));
        }
        if sessions.count == 0 {
            self.backend.lock().start()?;
        }
        sessions.count += 1;
        sessions.exclusive |= exclusive;
        Ok(())
    }

    fn release(&self, exclusive: bool) {
        let mut sessions = self.sessions.lock();
        sessions.count = sessions.count.saturating_sub(1);
        if exclusive {
            sessions.exclusive = false;
        }
        if sessions.count == 0 {
            if let Err(e) = self.backend.lock().stop() {
                tracing::warn!(display = %self.name, error = %e, "backend failed to stop");
            }
        }
    }

    /// Called once by a session as it ends
    pub(crate) fn session_ended(&self, session_id: &str, exclusive: bool) {
        self.release(exclusive);
        tracing::info!(display = %self.name, session = %session_id, "session ended");
        self.events.publish(&DisplayEvent::SessionEnded {
            session_id: session_id.to_string(),
        });
    }

    /// Per-tick pose refresh; non-finite poses are replaced by identity
    pub fn handle_new_frame(&self) -> Result<()> {
        let mut backend = self.backend.lock();
        let mut poses = self.poses.write();
        let result = backend.update_poses(&mut poses, &self.config);
        let replaced = poses.sanitize();
        if replaced > 0 {
            tracing::warn!(display = %self.name, replaced, "backend produced non-finite poses");
        }
        result
    }

    /// Post-render step after the application callback
    pub fn handle_after_frame(&self) -> Result<()> {
        self.backend.lock().submit_frame()
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
