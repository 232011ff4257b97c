//! Sessions and their frame loops
//!
//! A session moves `Created -> Active -> Ended` and never leaves `Ended`.
//! Each tick of a frame loop runs, in order:
//!
//! 1. re-arm the next tick
//! 2. apply queued anchor updates on the reality
//! 3. refresh the display's poses
//! 4. build the [`PresentationFrame`]
//! 5. camera-anchor maintenance
//! 6. the application callback
//! 7. the display's post-render step
//!
//! Re-arming first keeps the loop alive whatever the callback does.

use crate::anchor::{Anchor, AnchorId, AnchorOffset};
use crate::coordinates::{CoordinateSystemType, Coordinates};
use crate::display::Display;
use crate::error::{Result, XrError};
use crate::events::{Event, EventRegistry};
use crate::frame::PresentationFrame;
use crate::math::{Matrix4, ViewRay};
use crate::reality::Reality;
use crate::scheduler::{FramePacing, FrameRequestId};
use crate::worker::{PoseHistory, ResolvedDetection, WorkerResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What the application intends to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A fully virtual environment
    Reality,
    /// Content layered over the camera pass-through
    Augmentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub exclusive: bool,
    pub kind: SessionKind,
}

impl SessionParameters {
    pub fn augmentation() -> Self {
        Self {
            exclusive: false,
            kind: SessionKind::Augmentation,
        }
    }

    pub fn exclusive_reality() -> Self {
        Self {
            exclusive: true,
            kind: SessionKind::Reality,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Minimum frame-time gap between camera anchors
    pub camera_anchor_interval_ms: f64,
    /// Most camera anchors kept at once
    pub camera_anchor_cap: usize,
    pub frame_pacing: FramePacing,
    pub pose_history_capacity: usize,
    /// How far along the view ray a hit test with no hits places its anchor
    pub fallback_distance: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_anchor_interval_ms: 60_000.0,
            camera_anchor_cap: 10,
            frame_pacing: FramePacing::EveryFrame,
            pose_history_capacity: 120,
            fallback_distance: 1.0,
        }
    }
}

/// Handle to one frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CameraAnchorMinted(AnchorId),
    CameraAnchorEvicted(AnchorId),
    FrameLoopFailed { handle: FrameHandle, reason: String },
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    CameraAnchorMinted,
    CameraAnchorEvicted,
    FrameLoopFailed,
    Ended,
}

impl Event for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::CameraAnchorMinted(_) => SessionEventKind::CameraAnchorMinted,
            SessionEvent::CameraAnchorEvicted(_) => SessionEventKind::CameraAnchorEvicted,
            SessionEvent::FrameLoopFailed { .. } => SessionEventKind::FrameLoopFailed,
            SessionEvent::Ended => SessionEventKind::Ended,
        }
    }
}

/// Surface the application renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLayer {
    pub width: u32,
    pub height: u32,
}

/// Application frame callback.
///
/// Errors and panics are logged and isolated to the tick, except structural
/// errors (see [`XrError::is_structural`]) which stop the loop.
pub type FrameCallback = Box<dyn FnMut(&PresentationFrame<'_>) -> Result<()> + Send>;

struct FrameLoop {
    callback: Arc<Mutex<FrameCallback>>,
    scheduled: Option<FrameRequestId>,
    ticks: u64,
}

struct CameraAnchor {
    id: AnchorId,
    minted_at: f64,
}

struct SessionInner {
    id: String,
    display: Arc<Display>,
    reality: Arc<Reality>,
    parameters: SessionParameters,
    config: SessionConfig,
    state: Mutex<SessionState>,
    base_layer: Mutex<Option<RenderLayer>>,
    loops: Mutex<HashMap<FrameHandle, FrameLoop>>,
    next_loop: AtomicU64,
    introduced: Mutex<HashSet<AnchorId>>,
    camera_anchors: Mutex<VecDeque<CameraAnchor>>,
    pose_history: Mutex<PoseHistory>,
    events: EventRegistry<SessionEvent>,
}

/// One application's use of a display and reality.
///
/// Cheap to clone; frame loops hold only a weak reference, so a session
/// whose handles are all dropped stops ticking.
#[derive(Clone)]
pub struct Session(Arc<SessionInner>);

impl Session {
    pub(crate) fn new(
        display: Arc<Display>,
        reality: Arc<Reality>,
        parameters: SessionParameters,
        config: SessionConfig,
    ) -> Self {
        let pose_history = PoseHistory::new(config.pose_history_capacity);
        Self(Arc::new(SessionInner {
            id: Uuid::new_v4().to_string(),
            display,
            reality,
            parameters,
            config,
            state: Mutex::new(SessionState::Created),
            base_layer: Mutex::new(None),
            loops: Mutex::new(HashMap::new()),
            next_loop: AtomicU64::new(1),
            introduced: Mutex::new(HashSet::new()),
            camera_anchors: Mutex::new(VecDeque::new()),
            pose_history: Mutex::new(pose_history),
            events: EventRegistry::new(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn display(&self) -> &Arc<Display> {
        &self.0.display
    }

    pub fn reality(&self) -> &Arc<Reality> {
        &self.0.reality
    }

    pub fn parameters(&self) -> SessionParameters {
        self.0.parameters
    }

    pub fn config(&self) -> &SessionConfig {
        &self.0.config
    }

    pub fn state(&self) -> SessionState {
        *self.0.state.lock()
    }

    pub fn is_ended(&self) -> bool {
        self.0.is_ended()
    }

    pub fn events(&self) -> &EventRegistry<SessionEvent> {
        &self.0.events
    }

    pub fn base_layer(&self) -> Option<RenderLayer> {
        *self.0.base_layer.lock()
    }

    pub fn set_base_layer(&self, layer: RenderLayer) {
        *self.0.base_layer.lock() = Some(layer);
    }

    /// Start a frame loop running `callback` once per tick.
    ///
    /// Returns `None` once the session has ended.
    pub fn request_frame<F>(&self, callback: F) -> Option<FrameHandle>
    where
        F: FnMut(&PresentationFrame<'_>) -> Result<()> + Send + 'static,
    {
        {
            let mut state = self.0.state.lock();
            if *state == SessionState::Ended {
                return None;
            }
            *state = SessionState::Active;
        }

        let handle = FrameHandle(self.0.next_loop.fetch_add(1, Ordering::Relaxed));
        let callback: FrameCallback = Box::new(callback);
        self.0.loops.lock().insert(
            handle,
            FrameLoop {
                callback: Arc::new(Mutex::new(callback)),
                scheduled: None,
                ticks: 0,
            },
        );
        self.0.arm(handle);
        Some(handle)
    }

    /// Stop a frame loop; unknown handles and repeated calls are ignored
    pub fn cancel_frame(&self, handle: FrameHandle) {
        self.0.stop_loop(handle);
    }

    pub fn active_frame_loops(&self) -> usize {
        self.0.loops.lock().len()
    }

    /// Add a free-floating anchor owned by this session
    pub fn add_anchor(&self, coordinates: &Coordinates) -> Result<Anchor> {
        if self.is_ended() {
            return Err(XrError::SessionEnded);
        }
        let anchor = self.0.reality.add_anchor(coordinates)?;
        self.0.introduced.lock().insert(anchor.id().clone());
        Ok(anchor)
    }

    /// Remove an anchor from the reality, whoever introduced it
    pub fn remove_anchor(&self, id: &AnchorId) -> Result<()> {
        self.0.introduced.lock().remove(id);
        self.0.camera_anchors.lock().retain(|camera| &camera.id != id);
        if self.0.reality.remove_anchor(id) {
            Ok(())
        } else {
            Err(XrError::AnchorNotFound(id.to_string()))
        }
    }

    pub fn get_anchor(&self, id: &AnchorId) -> Option<Anchor> {
        self.0.reality.get_anchor(id)
    }

    /// Hit test a normalized screen point against the reality.
    ///
    /// Resolves to `None` when nothing can be placed or the session ended
    /// while the hit test was in flight; an anchor minted by a search that
    /// outlived the session is removed again.
    pub async fn find_anchor(&self, x: f32, y: f32) -> Result<Option<AnchorOffset>> {
        if self.is_ended() {
            return Ok(None);
        }

        let ray = self.view_ray(x, y);
        let result = self
            .0
            .reality
            .find_anchor(
                x,
                y,
                ray,
                self.0.display.poses(),
                self.0.config.fallback_distance,
            )
            .await;

        if self.is_ended() {
            if let Ok(Some(found)) = &result {
                if found.created {
                    self.0.reality.remove_anchor(&found.offset.anchor_id);
                }
            }
            tracing::debug!(session = %self.0.id, "discarding hit test that finished after end");
            return Ok(None);
        }

        let Some(found) = result? else {
            return Ok(None);
        };
        if found.created {
            self.0.introduced.lock().insert(found.offset.anchor_id.clone());
        }
        Ok(Some(found.offset))
    }

    fn view_ray(&self, x: f32, y: f32) -> Option<ViewRay> {
        let head = self.0.display.head_pose()?;
        let view = self.0.display.views().into_iter().next()?;
        ViewRay::from_screen(x, y, &view.projection, &head)
    }

    /// Camera anchors, oldest first
    pub fn camera_anchors(&self) -> Vec<AnchorId> {
        self.0
            .camera_anchors
            .lock()
            .iter()
            .map(|camera| camera.id.clone())
            .collect()
    }

    /// Head pose recorded at or just before `timestamp`
    pub fn pose_at(&self, timestamp: f64) -> Option<Matrix4> {
        self.0.pose_history.lock().pose_at(timestamp)
    }

    /// Map a worker's camera-relative detections into the tracker frame
    /// using the head pose of the frame they were computed from
    pub fn resolve_worker_result(&self, result: &WorkerResult) -> Option<Vec<ResolvedDetection>> {
        self.0.pose_history.lock().resolve(result)
    }

    /// End the session: stop every frame loop, remove every anchor it
    /// introduced and release the display and reality. Idempotent.
    pub fn end(&self) {
        {
            let mut state = self.0.state.lock();
            if *state == SessionState::Ended {
                return;
            }
            *state = SessionState::Ended;
        }

        let loops: Vec<FrameLoop> = self.0.loops.lock().drain().map(|(_, l)| l).collect();
        for frame_loop in loops {
            if let Some(request) = frame_loop.scheduled {
                self.0.display.scheduler().cancel_animation_frame(request);
            }
        }

        self.0.camera_anchors.lock().clear();
        let introduced: Vec<AnchorId> = self.0.introduced.lock().drain().collect();
        for id in &introduced {
            self.0.reality.remove_anchor(id);
        }

        self.0.reality.detach_session();
        self.0
            .display
            .session_ended(&self.0.id, self.0.parameters.exclusive);
        tracing::debug!(session = %self.0.id, anchors = introduced.len(), "session torn down");
        self.0.events.publish(&SessionEvent::Ended);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.0.id)
            .field("parameters", &self.0.parameters)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionInner {
    fn is_ended(&self) -> bool {
        *self.state.lock() == SessionState::Ended
    }

    /// Schedule the next tick of `handle`
    fn arm(self: &Arc<Self>, handle: FrameHandle) {
        let weak = Arc::downgrade(self);
        let scheduler = self.display.scheduler();
        let request = scheduler.request_animation_frame(Box::new(move |timestamp| {
            if let Some(inner) = weak.upgrade() {
                inner.tick(handle, timestamp);
            }
        }));

        let mut loops = self.loops.lock();
        match loops.get_mut(&handle) {
            Some(frame_loop) => frame_loop.scheduled = Some(request),
            None => {
                drop(loops);
                scheduler.cancel_animation_frame(request);
            }
        }
    }

    fn stop_loop(&self, handle: FrameHandle) -> bool {
        let removed = self.loops.lock().remove(&handle);
        match removed {
            Some(frame_loop) => {
                if let Some(request) = frame_loop.scheduled {
                    self.display.scheduler().cancel_animation_frame(request);
                }
                true
            }
            None => false,
        }
    }

    fn tick(self: &Arc<Self>, handle: FrameHandle, timestamp: f64) {
        if self.is_ended() {
            return;
        }

        let (callback, tick) = {
            let mut loops = self.loops.lock();
            let Some(frame_loop) = loops.get_mut(&handle) else {
                return;
            };
            let tick = frame_loop.ticks;
            frame_loop.ticks += 1;
            (frame_loop.callback.clone(), tick)
        };
        self.arm(handle);

        if !self.config.frame_pacing.should_run(tick) {
            tracing::trace!(session = %self.id, tick, "paced out");
            return;
        }

        self.reality.handle_new_frame(self.display.poses());

        if let Err(e) = self.display.handle_new_frame() {
            tracing::warn!(session = %self.id, error = %e, "pose update failed");
        }
        if let Some(head) = self.display.head_pose() {
            self.pose_history.lock().record(timestamp, head);
        }

        let session = Session(self.clone());
        let frame = PresentationFrame::new(&session, timestamp);

        self.maintain_camera_anchors(timestamp);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut callback = callback.lock();
            (&mut *callback)(&frame)
        }))
        .unwrap_or_else(|payload| Err(XrError::Callback(panic_message(payload.as_ref()))));
        let failure = match result {
            Ok(()) => None,
            Err(e) if e.is_structural() => Some(e.to_string()),
            Err(e) => {
                tracing::warn!(session = %self.id, tick, error = %e, "frame callback failed");
                None
            }
        };
        let failure = failure.or_else(|| {
            frame
                .reference_failure()
                .map(|kind| XrError::FrameOfReferenceUnavailable(kind).to_string())
        });
        drop(frame);

        if let Some(reason) = failure {
            if self.stop_loop(handle) {
                tracing::warn!(session = %self.id, reason = %reason, "frame loop stopped");
                self.events
                    .publish(&SessionEvent::FrameLoopFailed { handle, reason });
            }
        }

        if let Err(e) = self.display.handle_after_frame() {
            tracing::warn!(session = %self.id, error = %e, "frame submission failed");
        }
    }

    /// Mint a camera anchor at the eye-level pose when none exists or the
    /// newest is at least one interval old, then evict beyond the cap
    fn maintain_camera_anchors(&self, timestamp: f64) {
        let due = match self.camera_anchors.lock().back() {
            None => true,
            Some(newest) => timestamp - newest.minted_at >= self.config.camera_anchor_interval_ms,
        };
        if !due {
            return;
        }

        let eye_level = self.display.coordinate_system(CoordinateSystemType::EyeLevel);
        let anchor = match self
            .reality
            .add_anchor(&Coordinates::from_matrix(eye_level, Matrix4::IDENTITY))
        {
            Ok(anchor) => anchor,
            Err(e) => {
                tracing::debug!(session = %self.id, error = %e, "camera anchor skipped");
                return;
            }
        };
        let id = anchor.id().clone();
        self.introduced.lock().insert(id.clone());

        let evicted: Vec<AnchorId> = {
            let mut cameras = self.camera_anchors.lock();
            cameras.push_back(CameraAnchor {
                id: id.clone(),
                minted_at: timestamp,
            });
            let excess = cameras.len().saturating_sub(self.config.camera_anchor_cap);
            cameras.drain(..excess).map(|camera| camera.id).collect()
        };

        tracing::debug!(session = %self.id, anchor = %id, "camera anchor minted");
        self.events.publish(&SessionEvent::CameraAnchorMinted(id));

        for old in evicted {
            self.introduced.lock().remove(&old);
            self.reality.remove_anchor(&old);
            tracing::debug!(session = %self.id, anchor = %old, "camera anchor evicted");
            self.events.publish(&SessionEvent::CameraAnchorEvicted(old));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string());
    format!("panicked: {detail}")
}
