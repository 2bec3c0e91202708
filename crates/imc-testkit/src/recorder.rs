use imc_client::{ClientCallbacks, ClientState};
use imc_schemas::{DiffMessage, SnapshotMessage};
use parking_lot::Mutex;
use serde::Serialize;

/// One callback invocation, in delivery order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecordedEvent {
    FullUpdate { seq: u64, markers: Vec<String> },
    IncrementalUpdate { seq: u64, updated: Vec<String>, erased: Vec<String> },
    Error { server_id: String, reason: String },
    Status { server_id: String, state: String },
}

impl RecordedEvent {
    /// Sequence number for update events.
    pub fn seq(&self) -> Option<u64> {
        match self {
            RecordedEvent::FullUpdate { seq, .. } | RecordedEvent::IncrementalUpdate { seq, .. } => {
                Some(*seq)
            }
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RecordedEvent::Error { .. })
    }
}

/// Callback sink that keeps every event, plus the last full update payload.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<RecordedEvent>>,
    last_full: Mutex<Option<SnapshotMessage>>,
    last_incremental: Mutex<Option<DiffMessage>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Sequence numbers of emitted updates, in emission order.
    pub fn emitted_seqs(&self) -> Vec<u64> {
        self.events.lock().iter().filter_map(RecordedEvent::seq).collect()
    }

    pub fn error_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_error()).count()
    }

    pub fn states(&self) -> Vec<ClientState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Status { state, .. } => parse_state(state),
                _ => None,
            })
            .collect()
    }

    pub fn last_full_update(&self) -> Option<SnapshotMessage> {
        self.last_full.lock().clone()
    }

    pub fn last_incremental_update(&self) -> Option<DiffMessage> {
        self.last_incremental.lock().clone()
    }
}

fn parse_state(s: &str) -> Option<ClientState> {
    [
        ClientState::Bootstrapping,
        ClientState::Receiving,
        ClientState::TransformError,
    ]
    .into_iter()
    .find(|c| c.as_str() == s)
}

impl ClientCallbacks for RecordingCallbacks {
    fn on_full_update(&self, update: &SnapshotMessage) {
        *self.last_full.lock() = Some(update.clone());
        self.events.lock().push(RecordedEvent::FullUpdate {
            seq: update.sequence_number,
            markers: update.markers.iter().map(|m| m.name.clone()).collect(),
        });
    }

    fn on_incremental_update(&self, update: &DiffMessage) {
        *self.last_incremental.lock() = Some(update.clone());
        let updated = update
            .markers
            .iter()
            .map(|m| m.name.clone())
            .chain(update.poses.iter().map(|p| p.name.clone()))
            .collect();
        self.events.lock().push(RecordedEvent::IncrementalUpdate {
            seq: update.sequence_number,
            updated,
            erased: update.erases.clone(),
        });
    }

    fn on_error(&self, server_id: &str, reason: &str) {
        self.events.lock().push(RecordedEvent::Error {
            server_id: server_id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn on_status_change(&self, server_id: &str, state: ClientState) {
        self.events.lock().push(RecordedEvent::Status {
            server_id: server_id.to_string(),
            state: state.as_str().to_string(),
        });
    }
}
