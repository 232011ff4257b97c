//! Realities: the anchor tables sessions place content against
//!
//! A Reality owns every anchor it creates, keyed by id. Only the methods
//! here mutate the table. Backend updates that arrive between frames are
//! queued and applied at the start of the next tick by
//! [`Reality::handle_new_frame`].

mod backend;

pub use backend::{BridgeRealityBackend, LocalRealityBackend, RealityBackend};

use crate::anchor::{
    pick_best_hit, Anchor, AnchorId, AnchorOffset, AnchorPayload, HitResult, HitTestType,
};
use crate::coordinates::{CoordinateSystem, CoordinateSystemType, Coordinates, SharedPoses};
use crate::error::{Result, XrError};
use crate::events::{Event, EventRegistry};
use crate::math::{Matrix4, ViewRay};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A tracking change reported outside the frame loop
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorUpdate {
    /// Refined pose for a known id, or a newly detected anchor
    Upsert {
        id: AnchorId,
        transform: Matrix4,
        payload: Option<AnchorPayload>,
    },
    Removed {
        id: AnchorId,
    },
}

#[derive(Debug, Clone)]
pub enum RealityEvent {
    AnchorAdded(Anchor),
    AnchorUpdated(Anchor),
    AnchorRemoved(AnchorId),
    TrackingStarted,
    TrackingStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealityEventKind {
    AnchorAdded,
    AnchorUpdated,
    AnchorRemoved,
    TrackingStarted,
    TrackingStopped,
}

impl Event for RealityEvent {
    type Kind = RealityEventKind;

    fn kind(&self) -> RealityEventKind {
        match self {
            RealityEvent::AnchorAdded(_) => RealityEventKind::AnchorAdded,
            RealityEvent::AnchorUpdated(_) => RealityEventKind::AnchorUpdated,
            RealityEvent::AnchorRemoved(_) => RealityEventKind::AnchorRemoved,
            RealityEvent::TrackingStarted => RealityEventKind::TrackingStarted,
            RealityEvent::TrackingStopped => RealityEventKind::TrackingStopped,
        }
    }
}

/// Outcome of a successful [`Reality::find_anchor`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorMatch {
    pub offset: AnchorOffset,
    /// Whether the search minted a new anchor rather than reusing one
    pub created: bool,
}

/// Source of environment and anchor truth for one or more sessions
pub struct Reality {
    name: String,
    shared: bool,
    passthrough: bool,
    anchors: RwLock<HashMap<AnchorId, Anchor>>,
    retired: Mutex<HashSet<AnchorId>>,
    pending_updates: Mutex<Vec<AnchorUpdate>>,
    backend: Arc<dyn RealityBackend>,
    sessions: Mutex<usize>,
    events: EventRegistry<RealityEvent>,
}

impl Reality {
    pub fn new(
        name: impl Into<String>,
        shared: bool,
        passthrough: bool,
        backend: Arc<dyn RealityBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            shared,
            passthrough,
            anchors: RwLock::new(HashMap::new()),
            retired: Mutex::new(HashSet::new()),
            pending_updates: Mutex::new(Vec::new()),
            backend,
            sessions: Mutex::new(0),
            events: EventRegistry::new(),
        }
    }

    /// Shared camera pass-through reality
    pub fn camera(name: impl Into<String>, backend: Arc<dyn RealityBackend>) -> Self {
        Self::new(name, true, true, backend)
    }

    /// Private virtual environment for one exclusive session
    pub fn virtual_space(name: impl Into<String>) -> Self {
        Self::new(name, false, false, Arc::new(LocalRealityBackend::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    pub fn events(&self) -> &EventRegistry<RealityEvent> {
        &self.events
    }

    pub fn light_estimate(&self) -> Option<f32> {
        self.backend.light_estimate()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.read().len()
    }

    pub fn anchors(&self) -> Vec<Anchor> {
        self.anchors.read().values().cloned().collect()
    }

    pub fn get_anchor(&self, id: &AnchorId) -> Option<Anchor> {
        self.anchors.read().get(id).cloned()
    }

    /// Create a free-floating anchor at `coordinates`.
    ///
    /// The anchor is tracked immediately; the backend is told about it but
    /// its answer is not awaited.
    pub fn add_anchor(&self, coordinates: &Coordinates) -> Result<Anchor> {
        let source = coordinates.coordinate_system();
        let tracker = source.sibling(CoordinateSystemType::Tracker);
        let transform = coordinates
            .transformed_to(&tracker)
            .ok_or(XrError::TransformUnavailable {
                from: source.kind(),
                to: CoordinateSystemType::Tracker,
            })?
            .pose_matrix();
        if !transform.is_finite() {
            return Err(XrError::InvalidMatrix("anchor pose is not finite".into()));
        }

        // The anchor's pose is `relative * tracker`; pin it to the pose it has now
        let tracker_pose = tracker.current_pose_matrix()?;
        let inverse = tracker_pose
            .try_inverse()
            .ok_or_else(|| XrError::InvalidMatrix("tracker pose is not invertible".into()))?;
        tracker.set_relative_matrix(tracker_pose.multiply(&transform).multiply(&inverse));
        Ok(self.insert_new(tracker, AnchorPayload::Plain))
    }

    /// Remove an anchor; its id is retired and never handed out again
    pub fn remove_anchor(&self, id: &AnchorId) -> bool {
        if !self.remove_local(id) {
            return false;
        }
        if let Err(e) = self.backend.unregister_anchor(id) {
            tracing::warn!(reality = %self.name, anchor = %id, error = %e, "backend failed to drop anchor");
        }
        true
    }

    /// Queue an out-of-band update for the next tick
    pub fn enqueue_update(&self, update: AnchorUpdate) {
        self.pending_updates.lock().push(update);
    }

    /// Apply every update queued since the previous tick.
    ///
    /// New anchors reported by the backend are bound to `poses`.
    pub fn handle_new_frame(&self, poses: &SharedPoses) {
        let mut updates = std::mem::take(&mut *self.pending_updates.lock());
        updates.extend(self.backend.drain_updates());

        for update in updates {
            match update {
                AnchorUpdate::Upsert {
                    id,
                    transform,
                    payload,
                } => self.apply_upsert(poses, id, transform, payload),
                AnchorUpdate::Removed { id } => {
                    self.remove_local(&id);
                }
            }
        }
    }

    fn apply_upsert(
        &self,
        poses: &SharedPoses,
        id: AnchorId,
        transform: Matrix4,
        payload: Option<AnchorPayload>,
    ) {
        if !transform.is_finite() {
            tracing::warn!(reality = %self.name, anchor = %id, "dropping non-finite anchor update");
            return;
        }
        if self.retired.lock().contains(&id) {
            tracing::debug!(reality = %self.name, anchor = %id, "ignoring update for removed anchor");
            return;
        }

        if let Some(anchor) = self.get_anchor(&id) {
            anchor.apply_update(transform, payload);
            self.events.publish(&RealityEvent::AnchorUpdated(anchor));
            return;
        }

        let coordinate_system =
            CoordinateSystem::with_relative(poses.clone(), CoordinateSystemType::Tracker, transform);
        let anchor = Anchor::new(
            id.clone(),
            coordinate_system,
            payload.unwrap_or(AnchorPayload::Plain),
        );
        self.anchors.write().insert(id, anchor.clone());
        tracing::debug!(reality = %self.name, anchor = %anchor.id(), "backend anchor detected");
        self.events.publish(&RealityEvent::AnchorAdded(anchor));
    }

    /// Resolve a screen tap to an anchor.
    ///
    /// The best backend hit wins (see [`pick_best_hit`]): a hit on a known
    /// anchor resolves to an offset from it, any other hit mints an anchor at
    /// the hit pose. With no hits at all, an anchor is minted
    /// `fallback_distance` meters along `ray`. `None` only when there are no
    /// hits and no ray.
    pub async fn find_anchor(
        &self,
        x: f32,
        y: f32,
        ray: Option<ViewRay>,
        poses: &SharedPoses,
        fallback_distance: f32,
    ) -> Result<Option<AnchorMatch>> {
        let hits: Vec<HitResult> = self
            .backend
            .hit_test(x, y, HitTestType::all_mask())
            .await?
            .into_iter()
            .filter(|hit| hit.world_transform.is_finite() && hit.distance.is_finite())
            .collect();

        if let Some(best) = pick_best_hit(&hits) {
            tracing::debug!(reality = %self.name, hit_type = ?best.hit_type, distance = best.distance, "hit");
            if let Some(offset) = self.offset_from_existing(best) {
                return Ok(Some(AnchorMatch {
                    offset,
                    created: false,
                }));
            }
            let anchor = self.insert_at(poses, best.world_transform);
            return Ok(Some(AnchorMatch {
                offset: AnchorOffset::at_anchor(anchor.id().clone()),
                created: true,
            }));
        }

        let Some(ray) = ray else {
            tracing::debug!(reality = %self.name, "no hit and no view ray");
            return Ok(None);
        };
        let anchor = self.insert_at(
            poses,
            Matrix4::from_translation(ray.point_at(fallback_distance)),
        );
        Ok(Some(AnchorMatch {
            offset: AnchorOffset::at_anchor(anchor.id().clone()),
            created: true,
        }))
    }

    fn offset_from_existing(&self, hit: &HitResult) -> Option<AnchorOffset> {
        let id = hit.anchor_id.as_ref()?;
        let anchor = self.get_anchor(id)?;
        let inverse = anchor.pose_matrix().ok()?.try_inverse()?;
        Some(AnchorOffset::new(
            id.clone(),
            inverse.multiply(&hit.world_transform),
        ))
    }

    fn insert_at(&self, poses: &SharedPoses, transform: Matrix4) -> Anchor {
        let coordinate_system =
            CoordinateSystem::with_relative(poses.clone(), CoordinateSystemType::Tracker, transform);
        self.insert_new(coordinate_system, AnchorPayload::Plain)
    }

    fn insert_new(&self, coordinate_system: CoordinateSystem, payload: AnchorPayload) -> Anchor {
        let anchor = {
            let mut anchors = self.anchors.write();
            let retired = self.retired.lock();
            let id = loop {
                let candidate = AnchorId::generate();
                if !anchors.contains_key(&candidate) && !retired.contains(&candidate) {
                    break candidate;
                }
            };
            let anchor = Anchor::new(id.clone(), coordinate_system, payload);
            anchors.insert(id, anchor.clone());
            anchor
        };

        if let Err(e) = self.backend.register_anchor(&anchor) {
            tracing::warn!(reality = %self.name, anchor = %anchor.id(), error = %e, "backend failed to register anchor");
        }
        tracing::debug!(reality = %self.name, anchor = %anchor.id(), "anchor added");
        self.events.publish(&RealityEvent::AnchorAdded(anchor.clone()));
        anchor
    }

    fn remove_local(&self, id: &AnchorId) -> bool {
        let removed = self.anchors.write().remove(id);
        self.retired.lock().insert(id.clone());
        match removed {
            Some(_) => {
                tracing::debug!(reality = %self.name, anchor = %id, "anchor removed");
                self.events.publish(&RealityEvent::AnchorRemoved(id.clone()));
                true
            }
            None => false,
        }
    }

    /// Register a session; tracking starts with the first one
    pub fn attach_session(&self) -> Result<()> {
        {
            let mut sessions = self.sessions.lock();
            if *sessions == 0 {
                self.backend.start()?;
            }
            *sessions += 1;
            if *sessions > 1 {
                return Ok(());
            }
        }
        tracing::debug!(reality = %self.name, "tracking started");
        self.events.publish(&RealityEvent::TrackingStarted);
        Ok(())
    }

    /// Unregister a session; tracking stops with the last one
    pub fn detach_session(&self) {
        {
            let mut sessions = self.sessions.lock();
            if *sessions == 0 {
                return;
            }
            *sessions -= 1;
            if *sessions > 0 {
                return;
            }
            if let Err(e) = self.backend.stop() {
                tracing::warn!(reality = %self.name, error = %e, "backend failed to stop tracking");
            }
        }
        tracing::debug!(reality = %self.name, "tracking stopped");
        self.events.publish(&RealityEvent::TrackingStopped);
    }

    pub fn attached_sessions(&self) -> usize {
        *self.sessions.lock()
    }
}

impl std::fmt::Debug for Reality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reality")
            .field("name", &self.name)
            .field("shared", &self.shared)
            .field("passthrough", &self.passthrough)
            .field("anchors", &self.anchor_count())
            .finish()
    }
}
