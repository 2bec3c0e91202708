use chrono::{DateTime, Utc};
use imc_schemas::{DiffMessage, Header, InteractiveMarker, MarkerPoseUpdate, Pose, SnapshotMessage};

/// Server id used by the builders.
pub const SERVER: &str = "marker_server";

/// Fixed scenario epoch.
pub fn t0() -> DateTime<Utc> {
    ts(0)
}

/// `t0() + secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap_or_default()
}

/// Frame-locked marker (no stamp) at the origin of `frame`.
pub fn marker(name: &str, frame: &str) -> InteractiveMarker {
    InteractiveMarker::new(name, Header::new(frame), Pose::IDENTITY)
}

pub fn pose_update(name: &str, frame: &str, pose: Pose) -> MarkerPoseUpdate {
    MarkerPoseUpdate {
        header: Header::new(frame),
        name: name.to_string(),
        pose,
    }
}

/// Snapshot from [`SERVER`] carrying one marker per `(name, frame)`.
pub fn snapshot(seq: u64, markers: &[(&str, &str)]) -> SnapshotMessage {
    markers
        .iter()
        .fold(SnapshotMessage::new(SERVER, seq, t0()), |s, (n, f)| {
            s.with_marker(marker(n, f))
        })
}

/// Diff from [`SERVER`] moving marker `name`, expressed in `frame`.
pub fn diff(seq: u64, name: &str, frame: &str) -> DiffMessage {
    DiffMessage::new(SERVER, seq, t0()).with_pose(pose_update(name, frame, Pose::IDENTITY))
}
