//! Scenario: Stamped geometry waits until its transform is available
//!
//! # Invariants under test
//! - A stamped header is resolved at its stamp; asking before the transform
//!   history starts is transient (extrapolation), not a reset.
//! - Shape markers carrying their own frame are resolved independently.
//! - Each distinct (frame, time) pair is queried once per attempt and never
//!   again once resolved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use imc_client::{
    ClientCallbacks, ClientConfig, ClientState, FrameTree, ManualClock, SingleClient,
    TransformFailure, TransformResolver, TransformTime,
};
use imc_schemas::{
    Header, InteractiveMarker, MarkerControl, Pose, Shape, ShapeMarker, SnapshotMessage,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

/// Counts resolver calls on top of a frame tree.
struct Counting {
    tree: FrameTree,
    calls: AtomicUsize,
}

impl TransformResolver for Counting {
    fn transform(
        &self,
        frame: &str,
        target_frame: &str,
        at: TransformTime,
    ) -> Result<Pose, TransformFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tree.transform(frame, target_frame, at)
    }
}

#[derive(Default)]
struct Snapshots(parking_lot::Mutex<Vec<SnapshotMessage>>);

impl ClientCallbacks for Snapshots {
    fn on_full_update(&self, update: &SnapshotMessage) {
        self.0.lock().push(update.clone());
    }
}

fn marker_with_tool_shape() -> InteractiveMarker {
    let mut m = InteractiveMarker::new(
        "handle",
        Header::stamped("base", at(10)),
        Pose::from_translation(0.0, 1.0, 0.0),
    );
    m.controls.push(MarkerControl {
        name: "grip".into(),
        markers: vec![ShapeMarker {
            frame_id: Some("tool".into()),
            shape: Shape::Sphere,
            ..ShapeMarker::default()
        }],
        ..MarkerControl::default()
    });
    m
}

#[test]
fn stamped_marker_resolves_once_history_covers_its_stamp() {
    let resolver = Arc::new(Counting {
        tree: FrameTree::new(),
        calls: AtomicUsize::new(0),
    });
    resolver
        .tree
        .set_transform_since("map", "base", Pose::from_translation(2.0, 0.0, 0.0), at(20));
    resolver.tree.declare("tool");

    let sink = Arc::new(Snapshots::default());
    let clock = Arc::new(ManualClock::new(at(0)));
    let client = SingleClient::new(
        "srv",
        ClientConfig::for_target("map").with_keep_alive(Duration::from_secs(60)),
        resolver.clone(),
        sink.clone(),
    )
    .with_clock(clock.clone());

    client
        .ingest_snapshot(SnapshotMessage::new("srv", 1, at(10)).with_marker(marker_with_tool_shape()))
        .unwrap();

    // base is only known from t=20, tool has no transform yet.
    let report = client.advance();
    assert!(report.reset.is_none());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);

    resolver
        .tree
        .set_transform_since("map", "base", Pose::from_translation(2.0, 0.0, 0.0), at(0));
    client.advance();
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 4);
    assert_eq!(client.state(), ClientState::Bootstrapping);

    // Only the tool frame is asked for from here on.
    resolver.tree.set_transform("base", "tool", Pose::from_translation(0.0, 0.0, 1.0));
    clock.advance(Duration::from_secs(1));
    client.advance();
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);
    assert_eq!(client.state(), ClientState::Receiving);

    let emitted = sink.0.lock().clone();
    assert_eq!(emitted.len(), 1);
    let m = &emitted[0].markers[0];
    assert_eq!(m.header.frame_id, "map");
    assert!(m.pose.approx_eq(&Pose::from_translation(2.0, 1.0, 0.0), 1e-9));
    let shape = &m.controls[0].markers[0];
    assert_eq!(shape.frame_id.as_deref(), Some("map"));
    assert!(shape.pose.approx_eq(&Pose::from_translation(2.0, 0.0, 1.0), 1e-9));
}
