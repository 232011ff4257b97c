//! Environment-understanding backends behind a Reality

use super::AnchorUpdate;
use crate::anchor::{Anchor, AnchorId, HitResult};
use crate::bridge::BridgeClient;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a Reality asks of the tracking technology underneath it
#[async_trait]
pub trait RealityBackend: Send + Sync {
    /// Begin tracking; called when the first session attaches
    fn start(&self) -> Result<()>;

    /// Stop tracking; called when the last session detaches
    fn stop(&self) -> Result<()>;

    /// Announce an anchor created on this side
    fn register_anchor(&self, anchor: &Anchor) -> Result<()>;

    fn unregister_anchor(&self, id: &AnchorId) -> Result<()>;

    /// Candidate surfaces under a normalized screen point, filtered by type mask
    async fn hit_test(&self, x: f32, y: f32, types: u32) -> Result<Vec<HitResult>>;

    /// Anchor updates the backend received since the last call
    fn drain_updates(&self) -> Vec<AnchorUpdate>;

    /// Ambient light intensity, when the backend estimates it
    fn light_estimate(&self) -> Option<f32> {
        None
    }
}

/// Backend with no environment understanding: hit tests never find a surface
#[derive(Debug, Default)]
pub struct LocalRealityBackend {
    tracking: AtomicBool,
}

impl LocalRealityBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RealityBackend for LocalRealityBackend {
    fn start(&self) -> Result<()> {
        self.tracking.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.tracking.store(false, Ordering::Release);
        Ok(())
    }

    fn register_anchor(&self, _anchor: &Anchor) -> Result<()> {
        Ok(())
    }

    fn unregister_anchor(&self, _id: &AnchorId) -> Result<()> {
        Ok(())
    }

    async fn hit_test(&self, _x: f32, _y: f32, _types: u32) -> Result<Vec<HitResult>> {
        Ok(Vec::new())
    }

    fn drain_updates(&self) -> Vec<AnchorUpdate> {
        Vec::new()
    }
}

/// Backend that forwards anchor and hit-test traffic to a native AR bridge.
///
/// The watch stream itself belongs to the display driving the same bridge.
pub struct BridgeRealityBackend {
    client: Arc<BridgeClient>,
}

impl BridgeRealityBackend {
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RealityBackend for BridgeRealityBackend {
    fn start(&self) -> Result<()> {
        tracing::debug!(watching = self.client.is_watching(), "bridge reality started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        tracing::debug!("bridge reality stopped");
        Ok(())
    }

    fn register_anchor(&self, anchor: &Anchor) -> Result<()> {
        let transform = anchor.pose_matrix()?;
        self.client.notify_anchor_added(anchor.id(), transform)
    }

    fn unregister_anchor(&self, id: &AnchorId) -> Result<()> {
        self.client.notify_anchor_removed(id)
    }

    async fn hit_test(&self, x: f32, y: f32, types: u32) -> Result<Vec<HitResult>> {
        self.client.hit_test(x, y, types).await
    }

    fn drain_updates(&self) -> Vec<AnchorUpdate> {
        self.client.take_anchor_updates()
    }

    fn light_estimate(&self) -> Option<f32> {
        self.client.light_intensity()
    }
}
