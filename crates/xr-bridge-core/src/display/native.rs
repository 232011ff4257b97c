//! Display fed by a native AR bridge's camera stream

use super::{Display, DisplayBackend, DisplayCapabilities, DisplayConfig, DisplayKind, View};
use crate::bridge::{BridgeClient, WatchOptions};
use crate::coordinates::DevicePoses;
use crate::error::Result;
use crate::math::{Matrix4, Vector3D};
use crate::reality::{BridgeRealityBackend, Reality};
use crate::scheduler::FrameScheduler;
use std::sync::Arc;

/// Poses come from the latest camera transform on the watch stream.
///
/// The bridge's tracking origin is where the session started, at eye level,
/// so eye level is the tracker origin and the floor sits one seated eye
/// height below it. The head pose is unavailable until the first camera
/// update arrives.
pub struct NativeBridgeBackend {
    client: Arc<BridgeClient>,
    projection: Option<Matrix4>,
}

impl NativeBridgeBackend {
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self {
            client,
            projection: None,
        }
    }
}

impl DisplayBackend for NativeBridgeBackend {
    fn kind(&self) -> DisplayKind {
        DisplayKind::NativeBridge
    }

    fn capabilities(&self) -> DisplayCapabilities {
        DisplayCapabilities {
            can_present_exclusive: false,
            has_position: true,
            stereo: false,
        }
    }

    fn start(&mut self) -> Result<()> {
        self.client.watch(WatchOptions::default())
    }

    fn stop(&mut self) -> Result<()> {
        self.client.stop()
    }

    fn update_poses(&mut self, poses: &mut DevicePoses, config: &DisplayConfig) -> Result<()> {
        poses.tracker = Matrix4::IDENTITY;
        poses.eye_level = Some(Matrix4::IDENTITY);
        poses.stage = Some(Matrix4::from_translation(Vector3D::new(
            0.0,
            -config.sitting_eye_height,
            0.0,
        )));

        if let Some(camera) = self.client.latest_camera() {
            poses.head = Some(camera.transform);
            self.projection = Some(camera.projection);
        }
        Ok(())
    }

    fn views(&self, config: &DisplayConfig) -> Vec<View> {
        let projection = self
            .projection
            .unwrap_or_else(|| config.projection().matrix());
        vec![View::mono(projection)]
    }
}

/// A display and shared camera reality that both talk to `client`
pub fn native_bridge_display(
    name: impl Into<String>,
    client: Arc<BridgeClient>,
    scheduler: Arc<dyn FrameScheduler>,
    config: DisplayConfig,
) -> Arc<Display> {
    let name = name.into();
    let reality = Arc::new(Reality::camera(
        format!("{name}-camera"),
        Arc::new(BridgeRealityBackend::new(client.clone())),
    ));
    Display::new(
        name,
        Box::new(NativeBridgeBackend::new(client)),
        scheduler,
        reality,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RecordingTransport;
    use crate::scheduler::ManualScheduler;
    use crate::session::{SessionConfig, SessionParameters};

    #[tokio::test]
    async fn test_camera_stream_drives_head_pose() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(BridgeClient::new(transport.clone()));
        let display = native_bridge_display(
            "arkit",
            client.clone(),
            Arc::new(ManualScheduler::new()),
            DisplayConfig::default(),
        );
        assert!(display.head_pose().is_none());

        let session = display
            .request_session(SessionParameters::augmentation(), SessionConfig::default())
            .await
            .unwrap();
        assert!(client.is_watching());

        client
            .handle_incoming_json(
                r#"{"kind":"watch","update":{"camera":{
                    "transform":[1,0,0,0,0,1,0,0,0,0,1,0,0.5,0,0,1],
                    "projection":[1,0,0,0,0,1,0,0,0,0,-1,-1,0,0,-0.2,0]}}}"#,
            )
            .unwrap();
        display.handle_new_frame().unwrap();
        assert_eq!(display.head_pose().unwrap().translation().x, 0.5);
        assert_eq!(display.views()[0].projection.as_array()[11], -1.0);

        session.end();
        assert!(!client.is_watching());
    }
}
