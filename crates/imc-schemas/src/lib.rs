//! imc-schemas
//!
//! Message shapes delivered by a marker server (full snapshots and
//! incremental diffs) plus the small amount of rigid-body geometry needed to
//! re-express them in a target frame.
//!
//! Plain data. No IO, no clock, no transform lookups.

mod geometry;
mod messages;

pub use geometry::{Pose, Quaternion, Vector3};
pub use messages::*;
