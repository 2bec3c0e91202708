//! In-memory transform buffer.
//!
//! A forest of `parent -> child` edges, each carrying the child's pose in
//! the parent frame and the time from which it is valid. Good enough to
//! drive a client from recorded sessions and tests; a live deployment plugs
//! its own [`TransformResolver`] in instead.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use imc_config::FailureCause;
use imc_schemas::Pose;
use parking_lot::RwLock;

use crate::resolver::{TransformFailure, TransformResolver, TransformTime};

#[derive(Clone, Debug)]
struct Edge {
    parent: String,
    parent_from_child: Pose,
    valid_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    /// child -> edge to its parent
    edges: HashMap<String, Edge>,
    /// Frames announced before any transform for them arrived.
    declared: HashSet<String>,
    /// Frames the provider has declared extinct.
    invalid: HashSet<String>,
}

impl Inner {
    fn is_known(&self, frame: &str) -> bool {
        self.edges.contains_key(frame)
            || self.declared.contains(frame)
            || self.edges.values().any(|e| e.parent == frame)
    }

    /// Walk `frame` up to its root. Returns (root, root_from_frame).
    fn to_root(&self, frame: &str, at: TransformTime) -> Result<(String, Pose), TransformFailure> {
        let mut root_from_frame = Pose::IDENTITY;
        let mut cur = frame.to_string();
        let mut hops = 0usize;

        while let Some(edge) = self.edges.get(&cur) {
            if self.invalid.contains(&edge.parent) {
                return Err(TransformFailure::new(
                    FailureCause::InvalidFrame,
                    format!("ancestor frame '{}' of '{frame}' is invalid", edge.parent),
                ));
            }
            if let (TransformTime::At(t), Some(from)) = (at, edge.valid_from) {
                if t < from {
                    return Err(TransformFailure::new(
                        FailureCause::Extrapolation,
                        format!(
                            "transform '{}' -> '{cur}' only available from {}, requested {}",
                            edge.parent,
                            from.to_rfc3339(),
                            t.to_rfc3339()
                        ),
                    ));
                }
            }
            root_from_frame = edge.parent_from_child.compose(&root_from_frame);
            cur = edge.parent.clone();

            hops += 1;
            if hops > self.edges.len() {
                return Err(TransformFailure::new(
                    FailureCause::Lookup,
                    format!("cycle detected walking up from '{frame}'"),
                ));
            }
        }
        Ok((cur, root_from_frame))
    }

    fn check_frame(&self, frame: &str) -> Result<(), TransformFailure> {
        if self.invalid.contains(frame) {
            return Err(TransformFailure::new(
                FailureCause::InvalidFrame,
                format!("frame '{frame}' is invalid"),
            ));
        }
        if !self.is_known(frame) {
            return Err(TransformFailure::new(
                FailureCause::UnknownFrame,
                format!("frame '{frame}' does not exist"),
            ));
        }
        Ok(())
    }
}

/// Thread-safe transform buffer implementing [`TransformResolver`].
#[derive(Debug, Default)]
pub struct FrameTree {
    inner: RwLock<Inner>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the pose of `child` in `parent`, valid at all times.
    pub fn set_transform(&self, parent: &str, child: &str, parent_from_child: Pose) {
        self.insert_edge(parent, child, parent_from_child, None);
    }

    /// Set the pose of `child` in `parent`, valid from `valid_from` on.
    pub fn set_transform_since(
        &self,
        parent: &str,
        child: &str,
        parent_from_child: Pose,
        valid_from: DateTime<Utc>,
    ) {
        self.insert_edge(parent, child, parent_from_child, Some(valid_from));
    }

    fn insert_edge(&self, parent: &str, child: &str, pose: Pose, valid_from: Option<DateTime<Utc>>) {
        let mut g = self.inner.write();
        g.invalid.remove(child);
        g.declared.remove(child);
        g.edges.insert(
            child.to_string(),
            Edge {
                parent: parent.to_string(),
                parent_from_child: pose,
                valid_from,
            },
        );
    }

    /// Announce a frame whose transform has not arrived yet.
    pub fn declare(&self, frame: &str) {
        let mut g = self.inner.write();
        if !g.edges.contains_key(frame) {
            g.declared.insert(frame.to_string());
        }
    }

    /// Mark a frame extinct. Lookups through it fail permanently until a new
    /// transform for it is set.
    pub fn invalidate(&self, frame: &str) {
        let mut g = self.inner.write();
        g.edges.remove(frame);
        g.declared.remove(frame);
        g.invalid.insert(frame.to_string());
    }

    pub fn frame_count(&self) -> usize {
        let g = self.inner.read();
        let mut names: HashSet<&str> = HashSet::new();
        for (child, e) in g.edges.iter() {
            names.insert(child);
            names.insert(&e.parent);
        }
        names.extend(g.declared.iter().map(|s| s.as_str()));
        names.len()
    }
}

impl TransformResolver for FrameTree {
    fn transform(
        &self,
        frame: &str,
        target_frame: &str,
        at: TransformTime,
    ) -> Result<Pose, TransformFailure> {
        let g = self.inner.read();
        g.check_frame(frame)?;
        g.check_frame(target_frame)?;
        if frame == target_frame {
            return Ok(Pose::IDENTITY);
        }

        let known_but_unlinked =
            |f: &str| g.declared.contains(f) && !g.edges.values().any(|e| e.parent == f);
        for f in [frame, target_frame] {
            if known_but_unlinked(f) {
                return Err(TransformFailure::new(
                    FailureCause::NotYetAvailable,
                    format!("no transform received yet for frame '{f}'"),
                ));
            }
        }

        let (frame_root, root_from_frame) = g.to_root(frame, at)?;
        let (target_root, root_from_target) = g.to_root(target_frame, at)?;
        if frame_root != target_root {
            return Err(TransformFailure::new(
                FailureCause::Disconnected,
                format!(
                    "'{frame}' (tree '{frame_root}') and '{target_frame}' (tree '{target_root}') are not connected"
                ),
            ));
        }

        Ok(root_from_target.inverse().compose(&root_from_frame))
    }
}
