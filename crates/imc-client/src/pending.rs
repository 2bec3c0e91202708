//! Pending message wrapper.
//!
//! Decouples "message arrived" from "message is usable": a [`PendingEntry`]
//! owns one snapshot or diff together with every (frame, time) pair it
//! references, and tracks which of those have been resolved against the
//! target frame.
//!
//! # Invariants
//!
//! - A frame's status only ever flips unresolved -> resolved.
//! - A resolved frame is never queried again.
//! - The wrapped message is never mutated; [`PendingEntry::transformed`]
//!   builds the emitted copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use imc_config::{FailureCause, FailureClassification};
use imc_schemas::{DiffMessage, InteractiveMarker, Pose, SnapshotMessage};

use crate::resolver::{FrameQuery, TransformFailure, TransformResolver, TransformTime};

// ---------------------------------------------------------------------------
// Payload abstraction
// ---------------------------------------------------------------------------

/// A stream message whose geometry can be re-expressed in a target frame.
pub trait FramedPayload: Clone {
    fn sequence_number(&self) -> u64;

    fn server_id(&self) -> &str;

    /// Every distinct (frame, time) pair the geometry depends on.
    fn frame_queries(&self) -> BTreeSet<FrameQuery>;

    /// Copy with all geometry expressed in `target_frame`.
    ///
    /// `None` if `resolved` is missing a pose for any referenced frame.
    fn transformed(&self, resolved: &BTreeMap<FrameQuery, Pose>, target_frame: &str)
        -> Option<Self>;
}

fn collect_marker_queries(m: &InteractiveMarker, out: &mut BTreeSet<FrameQuery>) {
    out.insert(FrameQuery::of(&m.header));
    let at = TransformTime::of(&m.header);
    for control in &m.controls {
        for shape in &control.markers {
            if let Some(frame) = &shape.frame_id {
                if !frame.is_empty() {
                    out.insert(FrameQuery::new(frame.clone(), at));
                }
            }
        }
    }
}

fn transform_marker(
    m: &InteractiveMarker,
    resolved: &BTreeMap<FrameQuery, Pose>,
    target_frame: &str,
) -> Option<InteractiveMarker> {
    let at = TransformTime::of(&m.header);
    let mut out = m.clone();

    let target_from_marker = resolved.get(&FrameQuery::of(&m.header))?;
    out.pose = target_from_marker.compose(&m.pose);
    out.header.frame_id = target_frame.to_string();

    for control in out.controls.iter_mut() {
        for shape in control.markers.iter_mut() {
            let Some(frame) = shape.frame_id.as_ref().filter(|f| !f.is_empty()) else {
                continue;
            };
            let target_from_shape = resolved.get(&FrameQuery::new(frame.clone(), at))?;
            shape.pose = target_from_shape.compose(&shape.pose);
            shape.frame_id = Some(target_frame.to_string());
        }
    }
    Some(out)
}

impl FramedPayload for SnapshotMessage {
    fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn frame_queries(&self) -> BTreeSet<FrameQuery> {
        let mut out = BTreeSet::new();
        for m in &self.markers {
            collect_marker_queries(m, &mut out);
        }
        out
    }

    fn transformed(
        &self,
        resolved: &BTreeMap<FrameQuery, Pose>,
        target_frame: &str,
    ) -> Option<Self> {
        let markers = self
            .markers
            .iter()
            .map(|m| transform_marker(m, resolved, target_frame))
            .collect::<Option<Vec<_>>>()?;
        Some(SnapshotMessage {
            markers,
            ..self.clone()
        })
    }
}

impl FramedPayload for DiffMessage {
    fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn frame_queries(&self) -> BTreeSet<FrameQuery> {
        let mut out = BTreeSet::new();
        for m in &self.markers {
            collect_marker_queries(m, &mut out);
        }
        for p in &self.poses {
            out.insert(FrameQuery::of(&p.header));
        }
        out
    }

    fn transformed(
        &self,
        resolved: &BTreeMap<FrameQuery, Pose>,
        target_frame: &str,
    ) -> Option<Self> {
        let markers = self
            .markers
            .iter()
            .map(|m| transform_marker(m, resolved, target_frame))
            .collect::<Option<Vec<_>>>()?;

        let mut poses = self.poses.clone();
        for p in poses.iter_mut() {
            let target_from_frame = resolved.get(&FrameQuery::of(&p.header))?;
            p.pose = target_from_frame.compose(&p.pose);
            p.header.frame_id = target_frame.to_string();
        }

        Some(DiffMessage {
            markers,
            poses,
            ..self.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution outcome
// ---------------------------------------------------------------------------

/// A failure naming the frame it concerns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveFailure {
    pub frame: String,
    pub cause: FailureCause,
    pub detail: String,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame '{}' ({}): {}",
            self.frame,
            self.cause.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for ResolveFailure {}

/// Result of one resolution attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Every referenced frame is resolved; the entry can be emitted.
    AllResolved,
    /// Some frames are still missing for transient reasons; retry later.
    PartiallyResolved { unresolved: usize },
    /// A frame failed permanently; the client must reset.
    Failed(ResolveFailure),
}

// ---------------------------------------------------------------------------
// PendingEntry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PendingEntry<M> {
    message: M,
    frames: BTreeMap<FrameQuery, Option<Pose>>,
    received_at: DateTime<Utc>,
    attempts: u32,
    last_failure: Option<ResolveFailure>,
}

impl<M: FramedPayload> PendingEntry<M> {
    pub fn new(message: M, received_at: DateTime<Utc>) -> Self {
        let frames = message
            .frame_queries()
            .into_iter()
            .map(|q| (q, None))
            .collect();
        Self {
            message,
            frames,
            received_at,
            attempts: 0,
            last_failure: None,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.message.sequence_number()
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Number of attempts that actually had frames left to resolve.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent transient failure, kept for diagnostics.
    pub fn last_failure(&self) -> Option<&ResolveFailure> {
        self.last_failure.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.frames.values().all(Option::is_some)
    }

    pub fn unresolved_count(&self) -> usize {
        self.frames.values().filter(|p| p.is_none()).count()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Start an attempt: frames equal to the target resolve to identity
    /// immediately; the remaining unresolved queries are returned for the
    /// caller to put to a resolver.
    pub fn begin_attempt(&mut self, target_frame: &str) -> Vec<FrameQuery> {
        if self.is_resolved() {
            return Vec::new();
        }
        self.attempts += 1;

        let mut outstanding = Vec::new();
        for (q, slot) in self.frames.iter_mut() {
            if slot.is_some() {
                continue;
            }
            if q.frame == target_frame {
                *slot = Some(Pose::IDENTITY);
            } else {
                outstanding.push(q.clone());
            }
        }
        outstanding
    }

    /// Apply resolver answers gathered for queries from
    /// [`begin_attempt`](Self::begin_attempt).
    ///
    /// Successful answers are kept even when another frame fails
    /// permanently in the same batch.
    pub fn record_outcomes(
        &mut self,
        outcomes: Vec<(FrameQuery, Result<Pose, TransformFailure>)>,
        classification: &FailureClassification,
    ) -> Resolution {
        let mut permanent: Option<ResolveFailure> = None;

        for (q, result) in outcomes {
            match result {
                Ok(pose) => {
                    if let Some(slot) = self.frames.get_mut(&q) {
                        if slot.is_none() {
                            *slot = Some(pose);
                        }
                    }
                }
                Err(failure) => {
                    let rf = ResolveFailure {
                        frame: q.frame.clone(),
                        cause: failure.cause,
                        detail: failure.detail,
                    };
                    if classification.is_permanent(rf.cause) {
                        if permanent.is_none() {
                            permanent = Some(rf);
                        }
                    } else {
                        self.last_failure = Some(rf);
                    }
                }
            }
        }

        if let Some(rf) = permanent {
            return Resolution::Failed(rf);
        }
        if self.is_resolved() {
            Resolution::AllResolved
        } else {
            Resolution::PartiallyResolved {
                unresolved: self.unresolved_count(),
            }
        }
    }

    /// Query `resolver` once per still-unresolved frame and record the answers.
    ///
    /// Only for callers that hold no lock the resolver could need.
    pub fn attempt_resolve(
        &mut self,
        resolver: &dyn TransformResolver,
        target_frame: &str,
        classification: &FailureClassification,
    ) -> Resolution {
        let queries = self.begin_attempt(target_frame);
        let outcomes = queries
            .into_iter()
            .map(|q| {
                let r = resolver.transform(&q.frame, target_frame, q.at);
                (q, r)
            })
            .collect();
        self.record_outcomes(outcomes, classification)
    }

    /// The message with every pose expressed in `target_frame`.
    ///
    /// `None` until every referenced frame is resolved.
    pub fn transformed(&self, target_frame: &str) -> Option<M> {
        let mut resolved = BTreeMap::new();
        for (q, pose) in &self.frames {
            resolved.insert(q.clone(), (*pose)?);
        }
        self.message.transformed(&resolved, target_frame)
    }
}
