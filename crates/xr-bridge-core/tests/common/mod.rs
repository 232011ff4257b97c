#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use xr_bridge_core::anchor::{Anchor, AnchorId, HitResult};
use xr_bridge_core::bridge::{BridgeTransport, OutgoingMessage};
use xr_bridge_core::display::{
    Display, DisplayConfig, OrientationBackend, OrientationFeed, OrientationReading,
};
use xr_bridge_core::reality::{AnchorUpdate, Reality, RealityBackend};
use xr_bridge_core::scheduler::ManualScheduler;
use xr_bridge_core::Result;

/// Reality backend with canned hit results that counts anchor traffic
#[derive(Default)]
pub struct ScriptedBackend {
    pub hits: Mutex<Vec<HitResult>>,
    pub registered: AtomicUsize,
    pub unregistered: AtomicUsize,
    /// When set, hit tests wait for a permit before answering
    pub gate: Option<Arc<Notify>>,
    pub entered: Arc<Notify>,
}

impl ScriptedBackend {
    pub fn with_hits(hits: Vec<HitResult>) -> Self {
        Self {
            hits: Mutex::new(hits),
            ..Default::default()
        }
    }

    pub fn unregistered(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealityBackend for ScriptedBackend {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn register_anchor(&self, _anchor: &Anchor) -> Result<()> {
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister_anchor(&self, _id: &AnchorId) -> Result<()> {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn hit_test(&self, _x: f32, _y: f32, _types: u32) -> Result<Vec<HitResult>> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.hits.lock().clone())
    }

    fn drain_updates(&self) -> Vec<AnchorUpdate> {
        Vec::new()
    }
}

/// Device held upright, facing `alpha` degrees
pub fn upright(alpha: f32) -> OrientationReading {
    OrientationReading {
        alpha,
        beta: 90.0,
        gamma: 0.0,
        screen_orientation: 0.0,
    }
}

pub struct Rig {
    pub scheduler: Arc<ManualScheduler>,
    pub feed: OrientationFeed,
    pub display: Arc<Display>,
}

/// Orientation display over `backend`, with no reading pushed yet
pub fn orientation_rig(backend: Arc<dyn RealityBackend>) -> Rig {
    let scheduler = Arc::new(ManualScheduler::new());
    let (orientation, feed) = OrientationBackend::new();
    let display = Display::new(
        "flat",
        Box::new(orientation),
        scheduler.clone(),
        Arc::new(Reality::camera("camera", backend)),
        DisplayConfig::default(),
    );
    Rig {
        scheduler,
        feed,
        display,
    }
}

/// Bridge transport that keeps every outgoing message
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl BridgeTransport for RecordingTransport {
    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

impl RecordingTransport {
    pub async fn wait_for(&self, count: usize) -> OutgoingMessage {
        loop {
            if let Some(message) = self.sent.lock().get(count - 1) {
                return message.clone();
            }
            tokio::task::yield_now().await;
        }
    }
}
