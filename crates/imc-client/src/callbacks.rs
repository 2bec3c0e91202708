//! Outbound callback set.
//!
//! Invoked synchronously on the thread calling `advance()` (or, for the
//! error -> bootstrapping status change, the thread calling ingest). The
//! client holds none of its locks while a callback runs, so callbacks may
//! call back into the client. A callback that blocks stalls draining.

use imc_schemas::{DiffMessage, SnapshotMessage};

use crate::state::ClientState;

pub trait ClientCallbacks: Send + Sync {
    /// A snapshot, fully transformed into the target frame.
    fn on_full_update(&self, _update: &SnapshotMessage) {}

    /// A diff, fully transformed into the target frame.
    fn on_incremental_update(&self, _update: &DiffMessage) {}

    /// The client reset itself; `reason` is human readable.
    fn on_error(&self, _server_id: &str, _reason: &str) {}

    fn on_status_change(&self, _server_id: &str, _state: ClientState) {}
}

/// Discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopCallbacks;

impl ClientCallbacks for NoopCallbacks {}

type FullUpdateFn = Box<dyn Fn(&SnapshotMessage) + Send + Sync>;
type IncrementalUpdateFn = Box<dyn Fn(&DiffMessage) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str, &str) + Send + Sync>;
type StatusFn = Box<dyn Fn(&str, ClientState) + Send + Sync>;

/// Closure-backed callbacks; unset slots are no-ops.
#[derive(Default)]
pub struct CallbackSet {
    full_update: Option<FullUpdateFn>,
    incremental_update: Option<IncrementalUpdateFn>,
    error: Option<ErrorFn>,
    status: Option<StatusFn>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_full_update(mut self, f: impl Fn(&SnapshotMessage) + Send + Sync + 'static) -> Self {
        self.full_update = Some(Box::new(f));
        self
    }

    pub fn on_incremental_update(
        mut self,
        f: impl Fn(&DiffMessage) + Send + Sync + 'static,
    ) -> Self {
        self.incremental_update = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_status_change(mut self, f: impl Fn(&str, ClientState) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }
}

impl ClientCallbacks for CallbackSet {
    fn on_full_update(&self, update: &SnapshotMessage) {
        if let Some(f) = &self.full_update {
            f(update);
        }
    }

    fn on_incremental_update(&self, update: &DiffMessage) {
        if let Some(f) = &self.incremental_update {
            f(update);
        }
    }

    fn on_error(&self, server_id: &str, reason: &str) {
        if let Some(f) = &self.error {
            f(server_id, reason);
        }
    }

    fn on_status_change(&self, server_id: &str, state: ClientState) {
        if let Some(f) = &self.status {
            f(server_id, state);
        }
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("full_update", &self.full_update.is_some())
            .field("incremental_update", &self.incremental_update.is_some())
            .field("error", &self.error.is_some())
            .field("status", &self.status.is_some())
            .finish()
    }
}
