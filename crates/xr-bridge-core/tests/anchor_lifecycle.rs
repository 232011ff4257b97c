mod common;

use common::{orientation_rig, upright, RecordingTransport, ScriptedBackend};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;
use xr_bridge_core::anchor::{HitResult, HitTestType};
use xr_bridge_core::bridge::{BridgeClient, BridgeRequest, IncomingMessage};
use xr_bridge_core::display::{native_bridge_display, DisplayConfig};
use xr_bridge_core::reality::LocalRealityBackend;
use xr_bridge_core::scheduler::ManualScheduler;
use xr_bridge_core::{
    AnchorId, CoordinateSystemType, Coordinates, Matrix4, Reality, SessionConfig,
    SessionParameters, Vector3D, SITTING_EYE_HEIGHT,
};

fn hit(hit_type: HitTestType, z: f32) -> HitResult {
    HitResult {
        hit_type,
        distance: -z,
        world_transform: Matrix4::from_translation(Vector3D::new(0.0, 0.0, z)),
        anchor_id: None,
    }
}

#[test]
fn test_ids_are_never_reused() {
    let rig = orientation_rig(Arc::new(LocalRealityBackend::new()));
    let reality = rig.display.reality();
    let tracker = rig.display.coordinate_system(CoordinateSystemType::Tracker);
    const N: usize = 200;

    let mut seen = HashSet::new();
    let first: Vec<AnchorId> = (0..N)
        .map(|i| {
            let position = Vector3D::new(i as f32, 0.0, 0.0);
            reality
                .add_anchor(&Coordinates::at(tracker.clone(), position))
                .unwrap()
                .id()
                .clone()
        })
        .collect();
    for id in &first {
        assert!(reality.remove_anchor(id));
        assert!(reality.get_anchor(id).is_none());
    }
    seen.extend(first);

    for _ in 0..N {
        let anchor = reality
            .add_anchor(&Coordinates::at(tracker.clone(), Vector3D::ZERO))
            .unwrap();
        seen.insert(anchor.id().clone());
    }
    assert_eq!(seen.len(), 2 * N);
}

#[tokio::test]
async fn test_hit_tie_break_prefers_extent_plane() {
    let backend = Arc::new(ScriptedBackend::with_hits(vec![
        hit(HitTestType::FeaturePoint, -0.3),
        hit(HitTestType::ExistingPlane, -0.5),
        hit(HitTestType::ExistingPlaneUsingExtent, -3.0),
        hit(HitTestType::EstimatedHorizontalPlane, -0.4),
    ]));
    let rig = orientation_rig(backend.clone());
    rig.feed.push(upright(0.0));
    let session = rig
        .display
        .request_session(SessionParameters::augmentation(), SessionConfig::default())
        .await
        .unwrap();

    let offset = session.find_anchor(0.5, 0.5).await.unwrap().unwrap();
    let anchor = session.get_anchor(&offset.anchor_id).unwrap();
    assert_eq!(anchor.pose_matrix().unwrap().translation().z, -3.0);
    assert_eq!(offset.offset, Matrix4::IDENTITY);
    assert_eq!(backend.registered.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_hits_fall_back_along_view_ray() {
    let rig = orientation_rig(Arc::new(ScriptedBackend::default()));
    rig.feed.push(upright(90.0));
    rig.display.handle_new_frame().unwrap();
    let session = rig
        .display
        .request_session(SessionParameters::augmentation(), SessionConfig::default())
        .await
        .unwrap();

    let offset = session.find_anchor(0.5, 0.5).await.unwrap().unwrap();
    let anchor = session.get_anchor(&offset.anchor_id).unwrap();
    let position = anchor.pose_matrix().unwrap().translation();

    // Facing 90 degrees left, the center ray points down -X
    let expected = Vector3D::new(-1.0, SITTING_EYE_HEIGHT, 0.0);
    assert!(position.distance(&expected) < 1e-4, "got {:?}", position);
    let head = rig.display.head_pose().unwrap().translation();
    assert!((position.distance(&head) - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_hit_test_finishing_after_end_is_discarded() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend {
        gate: Some(gate.clone()),
        ..ScriptedBackend::with_hits(vec![hit(HitTestType::FeaturePoint, -1.0)])
    });
    let rig = orientation_rig(backend.clone());
    let session = rig
        .display
        .request_session(SessionParameters::augmentation(), SessionConfig::default())
        .await
        .unwrap();

    let search = {
        let session = session.clone();
        tokio::spawn(async move { session.find_anchor(0.5, 0.5).await })
    };
    backend.entered.notified().await;
    session.end();
    gate.notify_one();

    assert!(search.await.unwrap().unwrap().is_none());
    assert_eq!(rig.display.reality().anchor_count(), 0);
    assert_eq!(backend.unregistered(), 1);
}

#[tokio::test]
async fn test_find_anchor_through_native_bridge() {
    let transport = Arc::new(RecordingTransport::default());
    let client = Arc::new(BridgeClient::new(transport.clone()));
    let scheduler = Arc::new(ManualScheduler::new());
    let display = native_bridge_display(
        "arkit",
        client.clone(),
        scheduler.clone(),
        DisplayConfig::default(),
    );
    let session = display
        .request_session(SessionParameters::augmentation(), SessionConfig::default())
        .await
        .unwrap();
    // Sent: watch
    transport.wait_for(1).await;

    let search = {
        let session = session.clone();
        tokio::spawn(async move { session.find_anchor(0.25, 0.75).await })
    };
    let request = transport.wait_for(2).await;
    assert!(matches!(
        request.request,
        BridgeRequest::HitTest { x, y, types } if x == 0.25 && y == 0.75 && types == 63
    ));

    client.handle_incoming(IncomingMessage::Reply {
        correlation_id: request.correlation_id,
        result: json!([{
            "type": 1,
            "distance": 0.8,
            "world_transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0.1,-0.2,-0.8,1]
        }]),
    });

    let offset = search.await.unwrap().unwrap().unwrap();
    let anchor = session.get_anchor(&offset.anchor_id).unwrap();
    assert_eq!(
        anchor.pose_matrix().unwrap().translation(),
        Vector3D::new(0.1, -0.2, -0.8)
    );

    // The new anchor was announced to the bridge
    let announced = transport.wait_for(3).await;
    assert!(matches!(
        announced.request,
        BridgeRequest::AddAnchor { ref id, .. } if *id == offset.anchor_id
    ));
    assert_eq!(client.pending_requests(), 1);

    // The bridge's corrected pose lands on the next tick
    client.handle_incoming(IncomingMessage::Reply {
        correlation_id: announced.correlation_id,
        result: json!({
            "id": offset.anchor_id,
            "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0.1,-0.2,-0.9,1]
        }),
    });
    assert_eq!(client.pending_requests(), 0);
    session.request_frame(|_| Ok(())).unwrap();
    scheduler.run_frame(0.0);

    let corrected = anchor.pose_matrix().unwrap().translation();
    assert!(corrected.distance(&Vector3D::new(0.1, -0.2, -0.9)) < 1e-6);
}

#[tokio::test]
async fn test_bridge_failure_rejects_without_touching_anchors() {
    let transport = Arc::new(RecordingTransport::default());
    let client = Arc::new(BridgeClient::new(transport.clone()));
    let display = native_bridge_display(
        "arkit",
        client.clone(),
        Arc::new(ManualScheduler::new()),
        DisplayConfig::default(),
    );
    let session = display
        .request_session(SessionParameters::augmentation(), SessionConfig::default())
        .await
        .unwrap();
    let eye_level = display.coordinate_system(CoordinateSystemType::EyeLevel);
    session
        .add_anchor(&Coordinates::at(eye_level, Vector3D::new(0.0, 0.0, -1.0)))
        .unwrap();

    let search = {
        let session = session.clone();
        tokio::spawn(async move { session.find_anchor(0.5, 0.5).await })
    };
    // watch, add_anchor, hit_test
    let request = transport.wait_for(3).await;
    client.handle_incoming(IncomingMessage::Failure {
        correlation_id: request.correlation_id,
        message: "tracking lost".into(),
    });

    assert!(search.await.unwrap().is_err());
    assert_eq!(display.reality().anchor_count(), 1);
}

#[test]
fn test_private_reality_is_independent() {
    let virtual_space = Reality::virtual_space("vr");
    assert!(!virtual_space.is_shared());
    assert!(!virtual_space.is_passthrough());
}
