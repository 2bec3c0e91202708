//! Per-server client: owns both pending queues, the state machine and the
//! liveness record, and drives resolution + emission.
//!
//! # Locking
//!
//! Two locks, always taken in this order:
//!
//! 1. `drive` (re-entrant): serialises `advance()` calls. Held across
//!    resolver queries and callbacks. A nested `advance()` on the same thread
//!    (from inside a callback or the resolver) returns immediately; the outer
//!    call keeps draining.
//! 2. `core`: guards queues, state and liveness. Held only for short,
//!    non-blocking sections. Never held across a resolver query or a
//!    callback, so both may call ingest operations.
//!
//! Resolver answers carry the queue generation they were asked for; a reset
//! in between bumps the generation and the answers are dropped.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use imc_config::{ClientConfig, FailureClassification};
use imc_schemas::{DiffMessage, Pose, SnapshotMessage};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::callbacks::ClientCallbacks;
use crate::clock::{Clock, SystemClock};
use crate::liveness::LivenessRecord;
use crate::pending::{PendingEntry, Resolution, ResolveFailure};
use crate::queue::{Admission, SequenceQueue};
use crate::resolver::{FrameQuery, TransformFailure, TransformResolver};
use crate::state::{ClientState, StateEvent};

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stream {
    Snapshot,
    Diff,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Snapshot => f.write_str("snapshot"),
            Stream::Diff => f.write_str("diff"),
        }
    }
}

/// What ingest did with a well-formed message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Queued for resolution.
    Queued,
    /// Already queued, already emitted, or folded into an emitted snapshot.
    Duplicate,
    /// Snapshot older than one already queued.
    Superseded,
    /// Snapshot arriving after bootstrap completed.
    Ignored,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Queued => "queued",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::Superseded => "superseded",
            IngestOutcome::Ignored => "ignored",
        }
    }
}

/// Caller error at the ingest boundary. State is left untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestError {
    ServerIdentityMismatch { expected: String, got: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::ServerIdentityMismatch { expected, got } => write!(
                f,
                "message from server '{got}' delivered to client bound to '{expected}'"
            ),
        }
    }
}

impl std::error::Error for IngestError {}

/// Why the client reset itself into `TransformError`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetReason {
    PermanentFailure {
        stream: Stream,
        sequence: u64,
        failure: ResolveFailure,
    },
    KeepAliveExpired {
        waited: Duration,
        snapshots_pending: usize,
        diffs_pending: usize,
        /// Last transient failure of the blocking entry, if any.
        waiting_on: Option<ResolveFailure>,
        /// Resolution attempts made on the blocking entry.
        attempts: u32,
    },
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetReason::PermanentFailure {
                stream,
                sequence,
                failure,
            } => write!(
                f,
                "cannot transform {stream} #{sequence}: {failure}"
            ),
            ResetReason::KeepAliveExpired {
                waited,
                snapshots_pending,
                diffs_pending,
                waiting_on,
                attempts,
            } => {
                write!(
                    f,
                    "no update emitted for {:.1}s with {snapshots_pending} snapshot(s) and \
                     {diffs_pending} diff(s) pending",
                    waited.as_secs_f64()
                )?;
                match waiting_on {
                    Some(rf) => write!(f, "; waiting on {rf} after {attempts} attempt(s)"),
                    None if *snapshots_pending == 0 => write!(f, "; no snapshot received"),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Summary of one `advance()` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub emitted_snapshots: usize,
    pub emitted_diffs: usize,
    /// Diffs at or below an emitted bootstrap snapshot, dropped unemitted.
    pub folded_diffs: usize,
    pub reset: Option<ResetReason>,
    /// Call was a same-thread nested `advance()` and did nothing.
    pub reentrant: bool,
}

impl AdvanceReport {
    pub fn emitted(&self) -> usize {
        self.emitted_snapshots + self.emitted_diffs
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub snapshots: usize,
    pub diffs: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.snapshots + self.diffs
    }
}

// ---------------------------------------------------------------------------
// Core (guarded state)
// ---------------------------------------------------------------------------

enum Notification {
    FullUpdate(SnapshotMessage),
    IncrementalUpdate(DiffMessage),
    Error(String),
    Status(ClientState),
}

/// One resolution attempt taken out of the lock.
struct Work {
    generation: u64,
    stream: Stream,
    seq: u64,
    cursor: Option<u64>,
    queries: Vec<FrameQuery>,
}

enum Step {
    /// Keep draining this stream from the given cursor.
    Continue(Option<u64>),
    Stop,
}

struct Core {
    server_id: String,
    state: ClientState,
    snapshots: SequenceQueue<PendingEntry<SnapshotMessage>>,
    diffs: SequenceQueue<PendingEntry<DiffMessage>>,
    liveness: LivenessRecord,
    generation: u64,
    /// Sequence number of the snapshot emitted during this bootstrap.
    bootstrap_snapshot: Option<u64>,
}

impl Core {
    fn new(server_id: String, now: DateTime<Utc>) -> Self {
        Self {
            server_id,
            state: ClientState::Bootstrapping,
            snapshots: SequenceQueue::new(),
            diffs: SequenceQueue::new(),
            liveness: LivenessRecord::new(now),
            generation: 0,
            bootstrap_snapshot: None,
        }
    }

    fn counts(&self) -> PendingCounts {
        PendingCounts {
            snapshots: self.snapshots.len(),
            diffs: self.diffs.len(),
        }
    }

    fn set_state(&mut self, event: StateEvent, out: &mut Vec<Notification>) -> bool {
        let prev = self.state;
        match prev.transition(event) {
            Ok(next) if next != prev => {
                info!(server_id = %self.server_id, from = %prev, to = %next, ?event, "client state change");
                self.state = next;
                out.push(Notification::Status(next));
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(server_id = %self.server_id, error = %e, "ignored state event");
                false
            }
        }
    }

    // -- ingest -------------------------------------------------------------

    fn ingest_snapshot(
        &mut self,
        msg: SnapshotMessage,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> IngestOutcome {
        let seq = msg.sequence_number;

        if self.set_state(StateEvent::SnapshotArrived, out) {
            // Left TransformError: the keep-alive window restarts here.
            self.liveness.reset(now);
        }
        if self.state == ClientState::Receiving {
            debug!(server_id = %self.server_id, seq, "snapshot after bootstrap ignored");
            return IngestOutcome::Ignored;
        }

        if let Some(newest) = self.snapshots.highest() {
            if newest > seq {
                debug!(server_id = %self.server_id, seq, newest, "snapshot superseded on arrival");
                return IngestOutcome::Superseded;
            }
        }

        match self.snapshots.insert(seq, PendingEntry::new(msg, now)) {
            Admission::Admitted => {
                let evicted = self.snapshots.evict_below(seq);
                debug!(server_id = %self.server_id, seq, evicted, "snapshot queued");
                IngestOutcome::Queued
            }
            Admission::AlreadyQueued | Admission::AtOrBelowFloor { .. } => {
                debug!(server_id = %self.server_id, seq, "duplicate snapshot ignored");
                IngestOutcome::Duplicate
            }
        }
    }

    fn ingest_diff(
        &mut self,
        msg: DiffMessage,
        now: DateTime<Utc>,
        keep_alive: Duration,
    ) -> IngestOutcome {
        let seq = msg.sequence_number;
        if self.state == ClientState::TransformError {
            self.prune_held_diffs(now, keep_alive);
        }
        match self.diffs.insert(seq, PendingEntry::new(msg, now)) {
            Admission::Admitted => {
                debug!(server_id = %self.server_id, seq, "diff queued");
                IngestOutcome::Queued
            }
            Admission::AlreadyQueued => {
                debug!(server_id = %self.server_id, seq, "duplicate diff ignored");
                IngestOutcome::Duplicate
            }
            Admission::AtOrBelowFloor { floor } => {
                debug!(server_id = %self.server_id, seq, floor, "stale diff ignored");
                IngestOutcome::Duplicate
            }
        }
    }

    /// While in TransformError, diffs are held for the recovery snapshot
    /// only as long as the keep-alive window; older ones are dropped.
    fn prune_held_diffs(&mut self, now: DateTime<Utc>, keep_alive: Duration) {
        let dropped = self.diffs.retain(|_, e| {
            (now - e.received_at())
                .to_std()
                .map_or(true, |age| age <= keep_alive)
        });
        if dropped > 0 {
            debug!(server_id = %self.server_id, dropped, held = self.diffs.len(), "stale held diffs dropped");
        }
    }

    // -- drain --------------------------------------------------------------

    fn take_work(&mut self, stream: Stream, cursor: Option<u64>, target: &str) -> Option<Work> {
        let (seq, queries) = match stream {
            Stream::Snapshot => {
                if self.state != ClientState::Bootstrapping {
                    return None;
                }
                let (seq, _) = self.snapshots.peek_lowest()?;
                let entry = self.snapshots.get_mut(seq)?;
                (seq, entry.begin_attempt(target))
            }
            Stream::Diff => {
                let from = match self.state {
                    ClientState::TransformError => return None,
                    ClientState::Receiving => None,
                    // Diffs at or below the queued snapshot will be folded
                    // into it; don't spend queries on them.
                    ClientState::Bootstrapping => {
                        cursor.max(self.snapshots.peek_lowest().map(|(s, _)| s))
                    }
                };
                let (seq, _) = self.diffs.next_after(from)?;
                let entry = self.diffs.get_mut(seq)?;
                (seq, entry.begin_attempt(target))
            }
        };
        Some(Work {
            generation: self.generation,
            stream,
            seq,
            cursor,
            queries,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        work: Work,
        outcomes: Vec<(FrameQuery, Result<Pose, TransformFailure>)>,
        now: DateTime<Utc>,
        target: &str,
        classification: &FailureClassification,
        report: &mut AdvanceReport,
        out: &mut Vec<Notification>,
    ) -> Step {
        if work.generation != self.generation {
            debug!(server_id = %self.server_id, seq = work.seq, "client reset during resolution; answers dropped");
            return Step::Stop;
        }

        let resolution = match work.stream {
            Stream::Snapshot => match self.snapshots.get_mut(work.seq) {
                Some(e) => e.record_outcomes(outcomes, classification),
                // Evicted by a newer snapshot meanwhile; take the new head.
                None => return Step::Continue(work.cursor),
            },
            Stream::Diff => match self.diffs.get_mut(work.seq) {
                Some(e) => e.record_outcomes(outcomes, classification),
                None => return Step::Continue(work.cursor),
            },
        };

        match resolution {
            Resolution::Failed(failure) => {
                let reason = ResetReason::PermanentFailure {
                    stream: work.stream,
                    sequence: work.seq,
                    failure,
                };
                self.enter_error(StateEvent::PermanentFailure, reason.clone(), now, out);
                report.reset = Some(reason);
                Step::Stop
            }
            Resolution::PartiallyResolved { unresolved } => {
                debug!(server_id = %self.server_id, stream = %work.stream, seq = work.seq, unresolved, "waiting on transforms");
                Step::Stop
            }
            Resolution::AllResolved => match work.stream {
                Stream::Snapshot => self.emit_snapshot(work.seq, now, target, report, out),
                Stream::Diff => self.emit_diff(work.seq, work.cursor, now, target, report, out),
            },
        }
    }

    fn emit_snapshot(
        &mut self,
        seq: u64,
        now: DateTime<Utc>,
        target: &str,
        report: &mut AdvanceReport,
        out: &mut Vec<Notification>,
    ) -> Step {
        if self.snapshots.peek_lowest().map(|(s, _)| s) != Some(seq) {
            return Step::Continue(None);
        }
        let Some((_, entry)) = self.snapshots.pop_lowest() else {
            return Step::Stop;
        };
        let Some(msg) = entry.transformed(target) else {
            warn!(server_id = %self.server_id, seq, "resolved snapshot could not be transformed");
            return Step::Stop;
        };

        let folded = self.diffs.retire_through(seq);
        self.liveness.record_emission(seq, now);
        self.bootstrap_snapshot = Some(seq);
        report.emitted_snapshots += 1;
        report.folded_diffs += folded;
        info!(server_id = %self.server_id, seq, markers = msg.markers.len(), folded, "snapshot emitted");
        out.push(Notification::FullUpdate(msg));
        // Before the lock is released: a snapshot ingested from the full-update
        // callback must already see Receiving.
        self.check_init_finished(out);
        Step::Stop
    }

    fn emit_diff(
        &mut self,
        seq: u64,
        cursor: Option<u64>,
        now: DateTime<Utc>,
        target: &str,
        report: &mut AdvanceReport,
        out: &mut Vec<Notification>,
    ) -> Step {
        if self.state != ClientState::Receiving {
            // Resolved ahead of its snapshot; hold it and look further.
            return Step::Continue(Some(seq));
        }
        if self.diffs.peek_lowest().map(|(s, _)| s) != Some(seq) {
            // A lower diff arrived while we were resolving; it goes first.
            return Step::Continue(cursor);
        }
        let Some((_, entry)) = self.diffs.pop_lowest() else {
            return Step::Stop;
        };
        let Some(msg) = entry.transformed(target) else {
            warn!(server_id = %self.server_id, seq, "resolved diff could not be transformed");
            return Step::Stop;
        };

        self.liveness.record_emission(seq, now);
        report.emitted_diffs += 1;
        debug!(server_id = %self.server_id, seq, "diff emitted");
        out.push(Notification::IncrementalUpdate(msg));
        Step::Continue(None)
    }

    // -- checks -------------------------------------------------------------

    fn check_init_finished(&mut self, out: &mut Vec<Notification>) {
        if self.state != ClientState::Bootstrapping {
            return;
        }
        let Some(snap_seq) = self.bootstrap_snapshot else {
            return;
        };
        let orphaned = self
            .diffs
            .peek_lowest()
            .is_some_and(|(d, _)| d <= snap_seq);
        if !orphaned {
            self.set_state(StateEvent::InitFinished, out);
        }
    }

    fn check_keep_alive(
        &mut self,
        now: DateTime<Utc>,
        keep_alive: Duration,
        report: &mut AdvanceReport,
        out: &mut Vec<Notification>,
    ) {
        if self.state == ClientState::TransformError {
            self.prune_held_diffs(now, keep_alive);
            return;
        }
        let oldest = self
            .snapshots
            .iter()
            .map(|(_, e)| e.received_at())
            .chain(self.diffs.iter().map(|(_, e)| e.received_at()))
            .min();
        let Some(waited) = self.liveness.expired(now, oldest, keep_alive) else {
            return;
        };

        let head = match self.state {
            ClientState::Bootstrapping => self
                .snapshots
                .peek_lowest()
                .map(|(_, e)| (e.last_failure().cloned(), e.attempts())),
            _ => None,
        }
        .or_else(|| {
            self.diffs
                .peek_lowest()
                .map(|(_, e)| (e.last_failure().cloned(), e.attempts()))
        });
        let (waiting_on, attempts) = head.unwrap_or((None, 0));

        let counts = self.counts();
        let reason = ResetReason::KeepAliveExpired {
            waited,
            snapshots_pending: counts.snapshots,
            diffs_pending: counts.diffs,
            waiting_on,
            attempts,
        };
        self.enter_error(StateEvent::KeepAliveExpired, reason.clone(), now, out);
        report.reset = Some(reason);
    }

    fn enter_error(
        &mut self,
        event: StateEvent,
        reason: ResetReason,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) {
        let counts = self.counts();
        self.snapshots.clear();
        self.diffs.clear();
        self.liveness.reset(now);
        self.bootstrap_snapshot = None;
        self.generation += 1;

        warn!(
            server_id = %self.server_id,
            reason = %reason,
            dropped_snapshots = counts.snapshots,
            dropped_diffs = counts.diffs,
            "client reset"
        );
        self.set_state(event, out);
        out.push(Notification::Error(reason.to_string()));
    }
}

// ---------------------------------------------------------------------------
// SingleClient
// ---------------------------------------------------------------------------

/// Reconciles one marker server's snapshot and diff streams.
///
/// `Send + Sync`: ingest may be called from a transport thread while a
/// periodic driver calls [`advance`](Self::advance).
pub struct SingleClient {
    server_id: String,
    config: ClientConfig,
    resolver: Arc<dyn TransformResolver>,
    callbacks: Arc<dyn ClientCallbacks>,
    clock: Arc<dyn Clock>,
    core: Mutex<Core>,
    /// `true` while an `advance()` is draining on the owning thread.
    drive: ReentrantMutex<Cell<bool>>,
}

/// Clears the draining flag even if a callback panics.
struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl SingleClient {
    pub fn new(
        server_id: impl Into<String>,
        config: ClientConfig,
        resolver: Arc<dyn TransformResolver>,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let server_id = server_id.into();
        let core = Core::new(server_id.clone(), clock.now());
        Self {
            server_id,
            config,
            resolver,
            callbacks,
            clock,
            core: Mutex::new(core),
            drive: ReentrantMutex::new(Cell::new(false)),
        }
    }

    /// Replace the clock. The liveness epoch restarts at the new clock's now.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.core.get_mut().liveness = LivenessRecord::new(clock.now());
        self.clock = clock;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.core.lock().state
    }

    /// `true` once bootstrap has completed (any state but Bootstrapping).
    pub fn is_initialized(&self) -> bool {
        self.state().is_initialized()
    }

    pub fn pending_counts(&self) -> PendingCounts {
        self.core.lock().counts()
    }

    pub fn pending_sequence_numbers(&self, stream: Stream) -> Vec<u64> {
        let core = self.core.lock();
        match stream {
            Stream::Snapshot => core.snapshots.sequence_numbers(),
            Stream::Diff => core.diffs.sequence_numbers(),
        }
    }

    pub fn liveness(&self) -> LivenessRecord {
        self.core.lock().liveness.clone()
    }

    // -- ingest -------------------------------------------------------------

    pub fn ingest_snapshot(&self, msg: SnapshotMessage) -> Result<IngestOutcome, IngestError> {
        self.check_server(&msg.server_id)?;
        let now = self.clock.now();
        let mut out = Vec::new();
        let outcome = self.core.lock().ingest_snapshot(msg, now, &mut out);
        self.dispatch(out);
        Ok(outcome)
    }

    pub fn ingest_diff(&self, msg: DiffMessage) -> Result<IngestOutcome, IngestError> {
        self.check_server(&msg.server_id)?;
        let now = self.clock.now();
        let keep_alive = self.config.keep_alive();
        Ok(self.core.lock().ingest_diff(msg, now, keep_alive))
    }

    fn check_server(&self, got: &str) -> Result<(), IngestError> {
        if got == self.server_id {
            return Ok(());
        }
        warn!(server_id = %self.server_id, got, "message for another server rejected");
        Err(IngestError::ServerIdentityMismatch {
            expected: self.server_id.clone(),
            got: got.to_string(),
        })
    }

    // -- advance ------------------------------------------------------------

    /// Resolve and emit whatever is ready, then evaluate bootstrap completion
    /// and keep-alive. Bounded by the number of queued entries.
    pub fn advance(&self) -> AdvanceReport {
        let drive = self.drive.lock();
        if drive.replace(true) {
            debug!(server_id = %self.server_id, "nested advance ignored");
            return AdvanceReport {
                reentrant: true,
                ..AdvanceReport::default()
            };
        }
        let _draining = Draining(&*drive);

        let mut report = AdvanceReport::default();
        self.drain(Stream::Snapshot, &mut report);
        self.drain(Stream::Diff, &mut report);

        let now = self.clock.now();
        let keep_alive = self.config.keep_alive();
        self.with_core(|core, out| {
            core.check_init_finished(out);
            core.check_keep_alive(now, keep_alive, &mut report, out);
        });
        report
    }

    fn drain(&self, stream: Stream, report: &mut AdvanceReport) {
        let target = self.config.target_frame.as_str();
        let mut cursor = None;
        loop {
            let Some(work) = self.core.lock().take_work(stream, cursor, target) else {
                break;
            };

            let outcomes = self.query(&work.queries);
            let now = self.clock.now();

            let mut out = Vec::new();
            let step = self.core.lock().apply(
                work,
                outcomes,
                now,
                target,
                &self.config.failures,
                report,
                &mut out,
            );
            self.dispatch(out);

            match step {
                Step::Continue(next) => cursor = next,
                Step::Stop => break,
            }
        }
    }

    fn query(&self, queries: &[FrameQuery]) -> Vec<(FrameQuery, Result<Pose, TransformFailure>)> {
        let target = self.config.target_frame.as_str();
        queries
            .iter()
            .map(|q| (q.clone(), self.resolver.transform(&q.frame, target, q.at)))
            .collect()
    }

    fn with_core(&self, f: impl FnOnce(&mut Core, &mut Vec<Notification>)) {
        let mut out = Vec::new();
        {
            let mut core = self.core.lock();
            f(&mut core, &mut out);
        }
        self.dispatch(out);
    }

    fn dispatch(&self, out: Vec<Notification>) {
        for n in out {
            match n {
                Notification::FullUpdate(m) => self.callbacks.on_full_update(&m),
                Notification::IncrementalUpdate(m) => self.callbacks.on_incremental_update(&m),
                Notification::Error(reason) => self.callbacks.on_error(&self.server_id, &reason),
                Notification::Status(s) => self.callbacks.on_status_change(&self.server_id, s),
            }
        }
    }
}

impl fmt::Debug for SingleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleClient")
            .field("server_id", &self.server_id)
            .field("target_frame", &self.config.target_frame)
            .field("state", &self.state())
            .field("pending", &self.pending_counts())
            .finish()
    }
}
