use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Pose, Quaternion, Vector3};

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Coordinate frame + time a piece of geometry is expressed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub frame_id: String,
    /// `None` means "latest available transform" (frame-locked geometry).
    #[serde(default)]
    pub stamp: Option<DateTime<Utc>>,
}

impl Header {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp: None,
        }
    }

    pub fn stamped(frame_id: impl Into<String>, stamp: DateTime<Utc>) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp: Some(stamp),
        }
    }
}

// ---------------------------------------------------------------------------
// Marker content
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Cube,
    Sphere,
    Cylinder,
    Arrow,
}

/// One visual primitive of a control.
///
/// If `frame_id` is set the shape's pose is expressed in that frame instead
/// of the owning marker's frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeMarker {
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    pub pose: Pose,
    #[serde(default)]
    pub scale: Vector3,
    #[serde(default)]
    pub color: Color,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    None,
    Menu,
    Button,
    MoveAxis,
    MovePlane,
    RotateAxis,
    Move3d,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerControl {
    pub name: String,
    #[serde(default)]
    pub orientation: Quaternion,
    #[serde(default)]
    pub interaction_mode: InteractionMode,
    #[serde(default)]
    pub markers: Vec<ShapeMarker>,
}

/// A named, posed marker as published by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMarker {
    pub header: Header,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pose: Pose,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub controls: Vec<MarkerControl>,
}

fn default_scale() -> f64 {
    1.0
}

impl InteractiveMarker {
    pub fn new(name: impl Into<String>, header: Header, pose: Pose) -> Self {
        Self {
            header,
            name: name.into(),
            description: String::new(),
            pose,
            scale: default_scale(),
            controls: Vec::new(),
        }
    }
}

/// Pose-only update for an existing marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPoseUpdate {
    pub header: Header,
    pub name: String,
    pub pose: Pose,
}

// ---------------------------------------------------------------------------
// Stream messages
// ---------------------------------------------------------------------------

/// Full description of every marker the server currently knows ("init").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub server_id: String,
    pub sequence_number: u64,
    pub publish_time: DateTime<Utc>,
    #[serde(default)]
    pub markers: Vec<InteractiveMarker>,
}

impl SnapshotMessage {
    pub fn new(server_id: impl Into<String>, sequence_number: u64, publish_time: DateTime<Utc>) -> Self {
        Self {
            server_id: server_id.into(),
            sequence_number,
            publish_time,
            markers: Vec::new(),
        }
    }

    pub fn with_marker(mut self, m: InteractiveMarker) -> Self {
        self.markers.push(m);
        self
    }
}

/// Incremental add/update/delete operations ("update").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffMessage {
    pub server_id: String,
    pub sequence_number: u64,
    pub publish_time: DateTime<Utc>,
    /// Markers to add or replace wholesale.
    #[serde(default)]
    pub markers: Vec<InteractiveMarker>,
    /// Pose-only updates.
    #[serde(default)]
    pub poses: Vec<MarkerPoseUpdate>,
    /// Names of markers to delete.
    #[serde(default)]
    pub erases: Vec<String>,
}

impl DiffMessage {
    pub fn new(server_id: impl Into<String>, sequence_number: u64, publish_time: DateTime<Utc>) -> Self {
        Self {
            server_id: server_id.into(),
            sequence_number,
            publish_time,
            markers: Vec::new(),
            poses: Vec::new(),
            erases: Vec::new(),
        }
    }

    pub fn with_marker(mut self, m: InteractiveMarker) -> Self {
        self.markers.push(m);
        self
    }

    pub fn with_pose(mut self, p: MarkerPoseUpdate) -> Self {
        self.poses.push(p);
        self
    }

    pub fn with_erase(mut self, name: impl Into<String>) -> Self {
        self.erases.push(name.into());
        self
    }
}
