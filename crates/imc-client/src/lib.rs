//! imc-client
//!
//! Per-server reconciliation of a marker server's snapshot ("init") and diff
//! ("update") streams into one ordered, frame-resolved event sequence.
//!
//! - Ingest never blocks and never queries transforms.
//! - `advance()` is the only place transforms are resolved and events emitted.
//! - Emission order is ascending sequence number across both streams.
//! - A permanent transform failure or a stalled queue resets the client and
//!   surfaces exactly one error; a fresh snapshot restarts bootstrapping.

mod callbacks;
mod client;
mod clock;
mod frame_tree;
mod liveness;
mod pending;
mod queue;
mod resolver;
mod state;

pub use callbacks::{CallbackSet, ClientCallbacks, NoopCallbacks};
pub use client::{
    AdvanceReport, IngestError, IngestOutcome, PendingCounts, ResetReason, SingleClient, Stream,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use frame_tree::FrameTree;
pub use liveness::LivenessRecord;
pub use pending::{FramedPayload, PendingEntry, Resolution, ResolveFailure};
pub use queue::{Admission, SequenceQueue};
pub use resolver::{FrameQuery, TransformFailure, TransformResolver, TransformTime};
pub use state::{ClientState, IllegalTransition, StateEvent};

pub use imc_config::{ClientConfig, FailureCause, FailureClassification, FailureKind};
