//! Recorded sessions: a JSON list of transform changes, stream messages,
//! clock steps and advance ticks, replayed deterministically through a
//! [`SingleClient`] on a [`ManualClock`].
//!
//! ```json
//! {
//!   "server_id": "marker_server",
//!   "steps": [
//!     { "op": "set_transform", "parent": "map", "child": "base" },
//!     { "op": "snapshot", "message": { "server_id": "marker_server", ... } },
//!     { "op": "sleep", "millis": 250 },
//!     { "op": "advance" }
//!   ]
//! }
//! ```

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use imc_client::{FrameTree, IngestError, IngestOutcome, ManualClock, SingleClient};
use imc_config::ClientConfig;
use imc_schemas::{DiffMessage, Pose, SnapshotMessage};
use serde::{Deserialize, Serialize};

use crate::builders::t0;
use crate::recorder::{RecordedEvent, RecordingCallbacks};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Session {
    pub server_id: String,
    /// Clock value at the first step. Defaults to a fixed epoch.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    pub steps: Vec<SessionStep>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SessionStep {
    SetTransform {
        parent: String,
        child: String,
        #[serde(default)]
        pose: Pose,
        #[serde(default)]
        valid_from: Option<DateTime<Utc>>,
    },
    DeclareFrame {
        frame: String,
    },
    InvalidateFrame {
        frame: String,
    },
    Snapshot {
        message: SnapshotMessage,
    },
    Diff {
        message: DiffMessage,
    },
    Sleep {
        millis: u64,
    },
    Advance,
}

/// One line of replay output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayLine {
    Ingest {
        step: usize,
        stream: String,
        seq: u64,
        outcome: String,
    },
    Rejected {
        step: usize,
        error: String,
    },
    Advance {
        step: usize,
        emitted_snapshots: usize,
        emitted_diffs: usize,
        folded_diffs: usize,
        reset: Option<String>,
        state: String,
    },
    Callback {
        step: usize,
        event: RecordedEvent,
    },
}

pub fn load_session_json(path: &str) -> Result<Session> {
    let s = fs::read_to_string(path).with_context(|| format!("read session: {path}"))?;
    let session: Session = serde_json::from_str(&s).context("parse session json")?;
    Ok(session)
}

/// Replay `session` against a fresh client configured by `config`.
///
/// Ingest rejections are reported as lines, not errors: a recorded session
/// may legitimately contain messages from the wrong server.
pub fn replay(session: &Session, config: &ClientConfig) -> Result<Vec<ReplayLine>> {
    if session.server_id.trim().is_empty() {
        bail!("session server_id must not be empty");
    }

    let tree = Arc::new(FrameTree::new());
    let clock = Arc::new(ManualClock::new(session.start.unwrap_or_else(t0)));
    let recorder = Arc::new(RecordingCallbacks::new());
    let client = SingleClient::new(
        session.server_id.clone(),
        config.clone(),
        tree.clone(),
        recorder.clone(),
    )
    .with_clock(clock.clone());

    let mut out = Vec::new();
    for (step, s) in session.steps.iter().enumerate() {
        match s {
            SessionStep::SetTransform {
                parent,
                child,
                pose,
                valid_from,
            } => match valid_from {
                Some(t) => tree.set_transform_since(parent, child, *pose, *t),
                None => tree.set_transform(parent, child, *pose),
            },
            SessionStep::DeclareFrame { frame } => tree.declare(frame),
            SessionStep::InvalidateFrame { frame } => tree.invalidate(frame),
            SessionStep::Snapshot { message } => {
                let seq = message.sequence_number;
                let r = client.ingest_snapshot(message.clone());
                out.push(ingest_line(step, "snapshot", seq, r));
            }
            SessionStep::Diff { message } => {
                let seq = message.sequence_number;
                let r = client.ingest_diff(message.clone());
                out.push(ingest_line(step, "diff", seq, r));
            }
            SessionStep::Sleep { millis } => clock.advance(Duration::from_millis(*millis)),
            SessionStep::Advance => {
                let report = client.advance();
                out.extend(callback_lines(step, &recorder));
                out.push(ReplayLine::Advance {
                    step,
                    emitted_snapshots: report.emitted_snapshots,
                    emitted_diffs: report.emitted_diffs,
                    folded_diffs: report.folded_diffs,
                    reset: report.reset.map(|r| r.to_string()),
                    state: client.state().as_str().to_string(),
                });
                continue;
            }
        }
        // Ingest can notify too (error -> bootstrapping).
        out.extend(callback_lines(step, &recorder));
    }
    Ok(out)
}

fn ingest_line(
    step: usize,
    stream: &str,
    seq: u64,
    r: Result<IngestOutcome, IngestError>,
) -> ReplayLine {
    match r {
        Ok(outcome) => ReplayLine::Ingest {
            step,
            stream: stream.to_string(),
            seq,
            outcome: outcome.as_str().to_string(),
        },
        Err(e) => ReplayLine::Rejected {
            step,
            error: e.to_string(),
        },
    }
}

fn callback_lines(step: usize, recorder: &RecordingCallbacks) -> Vec<ReplayLine> {
    recorder
        .take()
        .into_iter()
        .map(|event| ReplayLine::Callback { step, event })
        .collect()
}
