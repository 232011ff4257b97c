//! Request/response channel to a native AR bridge
//!
//! Outgoing requests carry a locally generated correlation id; replies are
//! routed back to the waiting caller by [`BridgeClient::handle_incoming`].
//! Notifications carry an id too but register nothing, except anchor
//! additions whose reply is turned into an anchor update.
//! The streaming watch channel is buffered here and drained by the display
//! and reality at the start of the next tick.

use super::messages::{
    AddedAnchor, BridgeHit, BridgeRequest, CameraUpdate, DeviceInfo, IncomingMessage,
    InitializeOptions, OutgoingMessage, WatchOptions, WatchUpdate,
};
use crate::anchor::{AnchorId, HitResult};
use crate::error::{Result, XrError};
use crate::math::Matrix4;
use crate::reality::AnchorUpdate;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Carries serialized requests to the native side
pub trait BridgeTransport: Send + Sync {
    fn send(&self, message: &OutgoingMessage) -> Result<()>;
}

type Reply = Result<Value>;

/// A request that has been sent and awaits its reply
pub struct PendingReply {
    correlation_id: String,
    receiver: oneshot::Receiver<Reply>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the reply; `BridgeClosed` if the client closed first
    pub async fn recv(self) -> Result<Value> {
        self.receiver.await.map_err(|_| XrError::BridgeClosed)?
    }

    async fn recv_as<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.recv().await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Client side of the native bridge
pub struct BridgeClient {
    transport: Arc<dyn BridgeTransport>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    /// Anchor additions awaiting the bridge's corrected transform
    anchor_acks: Mutex<HashMap<String, AnchorId>>,
    watching: AtomicBool,
    closed: AtomicBool,
    latest_camera: Mutex<Option<CameraUpdate>>,
    anchor_updates: Mutex<Vec<AnchorUpdate>>,
    light_intensity: Mutex<Option<f32>>,
}

impl BridgeClient {
    pub fn new(transport: Arc<dyn BridgeTransport>) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            anchor_acks: Mutex::new(HashMap::new()),
            watching: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            latest_camera: Mutex::new(None),
            anchor_updates: Mutex::new(Vec::new()),
            light_intensity: Mutex::new(None),
        }
    }

    /// Send `request` and register a reply slot for it
    pub fn send_request(&self, request: BridgeRequest) -> Result<PendingReply> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XrError::BridgeClosed);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(correlation_id.clone(), sender);

        if let Err(e) = self.transmit(&correlation_id, request) {
            self.pending.lock().remove(&correlation_id);
            return Err(e);
        }

        Ok(PendingReply {
            correlation_id,
            receiver,
        })
    }

    /// Send `request` without keeping anything for its reply
    pub fn send_notification(&self, request: BridgeRequest) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XrError::BridgeClosed);
        }
        self.transmit(&Uuid::new_v4().to_string(), request)
    }

    fn transmit(&self, correlation_id: &str, request: BridgeRequest) -> Result<()> {
        self.transport.send(&OutgoingMessage {
            correlation_id: correlation_id.to_string(),
            request,
        })
    }

    pub async fn initialize(&self, options: InitializeOptions) -> Result<DeviceInfo> {
        self.send_request(BridgeRequest::Initialize { options })?
            .recv_as()
            .await
    }

    /// Hit test a normalized screen point; unknown hit types are skipped
    pub async fn hit_test(&self, x: f32, y: f32, types: u32) -> Result<Vec<HitResult>> {
        let hits: Vec<BridgeHit> = self
            .send_request(BridgeRequest::HitTest { x, y, types })?
            .recv_as()
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let bits = hit.hit_type;
                let result = hit.into_hit_result();
                if result.is_none() {
                    tracing::debug!(hit_type = bits, "skipping unknown hit type");
                }
                result
            })
            .collect())
    }

    pub async fn add_anchor(&self, id: AnchorId, transform: Matrix4) -> Result<AddedAnchor> {
        self.send_request(BridgeRequest::AddAnchor { id, transform })?
            .recv_as()
            .await
    }

    /// Tell the bridge about a locally created anchor without waiting.
    ///
    /// The transform the bridge replies with is queued as an
    /// [`AnchorUpdate::Upsert`] for the next tick.
    pub fn notify_anchor_added(&self, id: &AnchorId, transform: Matrix4) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XrError::BridgeClosed);
        }

        let correlation_id = Uuid::new_v4().to_string();
        self.anchor_acks
            .lock()
            .insert(correlation_id.clone(), id.clone());
        let request = BridgeRequest::AddAnchor {
            id: id.clone(),
            transform,
        };
        if let Err(e) = self.transmit(&correlation_id, request) {
            self.anchor_acks.lock().remove(&correlation_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn notify_anchor_removed(&self, id: &AnchorId) -> Result<()> {
        self.send_notification(BridgeRequest::RemoveAnchor { id: id.clone() })
    }

    /// Start the streaming watch channel
    pub fn watch(&self, options: WatchOptions) -> Result<()> {
        self.send_notification(BridgeRequest::Watch { options })?;
        self.watching.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the streaming watch channel
    pub fn stop(&self) -> Result<()> {
        self.watching.store(false, Ordering::Release);
        self.send_notification(BridgeRequest::Stop)
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    /// Route a message from the native side
    pub fn handle_incoming(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Reply {
                correlation_id,
                result,
            } => self.resolve(&correlation_id, Ok(result)),
            IncomingMessage::Failure {
                correlation_id,
                message,
            } => self.resolve(&correlation_id, Err(XrError::Bridge(message))),
            IncomingMessage::Watch { update } => self.handle_watch(update),
        }
    }

    /// Parse and route a raw JSON message
    pub fn handle_incoming_json(&self, raw: &str) -> Result<()> {
        let message: IncomingMessage = serde_json::from_str(raw)?;
        self.handle_incoming(message);
        Ok(())
    }

    fn resolve(&self, correlation_id: &str, reply: Reply) {
        let sender = self.pending.lock().remove(correlation_id);
        if let Some(sender) = sender {
            // The caller may have stopped waiting; that is not an error here
            let _ = sender.send(reply);
            return;
        }

        let anchor = self.anchor_acks.lock().remove(correlation_id);
        match anchor {
            Some(requested) => self.acknowledge_anchor(requested, reply),
            None => {
                tracing::debug!(correlation_id, "reply for unknown or already resolved request");
            }
        }
    }

    fn acknowledge_anchor(&self, requested: AnchorId, reply: Reply) {
        let added = reply.and_then(|value| Ok(serde_json::from_value::<AddedAnchor>(value)?));
        match added {
            Ok(added) => {
                if added.id != requested {
                    tracing::warn!(anchor = %requested, replied = %added.id, "bridge acknowledged a different anchor");
                }
                self.anchor_updates.lock().push(AnchorUpdate::Upsert {
                    id: added.id,
                    transform: added.transform,
                    payload: None,
                });
            }
            Err(e) => {
                tracing::warn!(anchor = %requested, error = %e, "bridge did not accept anchor");
            }
        }
    }

    fn handle_watch(&self, update: WatchUpdate) {
        if !self.is_watching() {
            tracing::debug!("dropping watch update while not watching");
            return;
        }

        if let Some(camera) = update.camera {
            *self.latest_camera.lock() = Some(camera);
        }
        if update.light_intensity.is_some() {
            *self.light_intensity.lock() = update.light_intensity;
        }

        let mut updates = self.anchor_updates.lock();
        updates.extend(update.anchors.into_iter().map(|anchor| AnchorUpdate::Upsert {
            id: anchor.id,
            transform: anchor.transform,
            payload: anchor.payload,
        }));
        updates.extend(
            update
                .removed_anchors
                .into_iter()
                .map(|id| AnchorUpdate::Removed { id }),
        );
    }

    pub fn latest_camera(&self) -> Option<CameraUpdate> {
        self.latest_camera.lock().clone()
    }

    pub fn light_intensity(&self) -> Option<f32> {
        *self.light_intensity.lock()
    }

    /// Drain anchor updates received since the last call
    pub fn take_anchor_updates(&self) -> Vec<AnchorUpdate> {
        std::mem::take(&mut *self.anchor_updates.lock())
    }

    /// Requests whose reply is still expected
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len() + self.anchor_acks.lock().len()
    }

    /// Reject every outstanding request and refuse new ones
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.watching.store(false, Ordering::Release);
        self.anchor_acks.lock().clear();
        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, sender) in pending {
            let _ = sender.send(Err(XrError::BridgeClosed));
        }
    }
}
