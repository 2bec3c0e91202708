//! Scenario: Callbacks and concurrent producers may call into the client
//!
//! # Invariants under test
//! - No client lock is held while a callback runs: a callback may ingest.
//! - A nested `advance()` from a callback returns immediately and reports
//!   itself as re-entrant; the outer call keeps draining.
//! - Ingest from another thread while `advance()` runs never breaks
//!   emission order.
//! - A message for another server is rejected without side effects.

use std::sync::{Arc, OnceLock, Weak};
use std::thread;

use imc_client::{
    ClientCallbacks, ClientConfig, FrameTree, IngestError, SingleClient, Stream,
};
use imc_schemas::{DiffMessage, Pose, SnapshotMessage};
use imc_testkit::{diff, snapshot, Harness, RecordingCallbacks};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records, then feeds the next diff back into the client until `stop_at`.
struct Chaining {
    client: OnceLock<Weak<SingleClient>>,
    recorder: Arc<RecordingCallbacks>,
    stop_at: u64,
    nested_reports: parking_lot::Mutex<Vec<bool>>,
}

impl Chaining {
    fn client(&self) -> Option<Arc<SingleClient>> {
        self.client.get().and_then(Weak::upgrade)
    }
}

impl ClientCallbacks for Chaining {
    fn on_full_update(&self, update: &SnapshotMessage) {
        self.recorder.on_full_update(update);
        if let Some(c) = self.client() {
            let nested = c.advance();
            self.nested_reports.lock().push(nested.reentrant);
        }
    }

    fn on_incremental_update(&self, update: &DiffMessage) {
        self.recorder.on_incremental_update(update);
        let next = update.sequence_number + 1;
        if next <= self.stop_at {
            if let Some(c) = self.client() {
                c.ingest_diff(diff(next, "m", "base")).unwrap();
            }
        }
    }
}

fn tree() -> Arc<FrameTree> {
    let t = Arc::new(FrameTree::new());
    t.set_transform("map", "base", Pose::IDENTITY);
    t
}

// ---------------------------------------------------------------------------
// 1. Re-entrant callbacks
// ---------------------------------------------------------------------------

#[test]
fn callback_ingest_is_drained_by_the_same_advance() {
    let recorder = Arc::new(RecordingCallbacks::new());
    let cb = Arc::new(Chaining {
        client: OnceLock::new(),
        recorder: recorder.clone(),
        stop_at: 10,
        nested_reports: Default::default(),
    });
    let client = Arc::new(SingleClient::new(
        imc_testkit::SERVER,
        ClientConfig::for_target("map"),
        tree(),
        cb.clone(),
    ));
    let _ = cb.client.set(Arc::downgrade(&client));

    client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    client.ingest_diff(diff(2, "m", "base")).unwrap();
    let report = client.advance();

    assert_eq!(*cb.nested_reports.lock(), vec![true]);
    assert!(!report.reentrant);
    assert_eq!(recorder.emitted_seqs(), (1..=10).collect::<Vec<_>>());
    assert_eq!(client.pending_counts().total(), 0);
}

// ---------------------------------------------------------------------------
// 2. Concurrent producer
// ---------------------------------------------------------------------------

#[test]
fn concurrent_ingest_keeps_order() {
    let recorder = Arc::new(RecordingCallbacks::new());
    let client = Arc::new(SingleClient::new(
        imc_testkit::SERVER,
        ClientConfig::for_target("map"),
        tree(),
        recorder.clone(),
    ));
    client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();

    let producer = {
        let client = client.clone();
        thread::spawn(move || {
            for seq in (2..200).rev() {
                client.ingest_diff(diff(seq, "m", "base")).unwrap();
            }
        })
    };
    for _ in 0..50 {
        client.advance();
    }
    producer.join().unwrap();
    client.advance();

    let seqs = recorder.emitted_seqs();
    assert_eq!(seqs.first(), Some(&1));
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert!(client.pending_sequence_numbers(Stream::Diff).is_empty());
}

// ---------------------------------------------------------------------------
// 3. Server identity
// ---------------------------------------------------------------------------

#[test]
fn wrong_server_is_rejected_untouched() {
    let h = Harness::default();
    let mut stray = diff(5, "m", "base");
    stray.server_id = "other_server".into();

    let err = h.client.ingest_diff(stray).unwrap_err();
    assert!(matches!(err, IngestError::ServerIdentityMismatch { .. }));
    assert!(err.to_string().contains("other_server"));
    assert_eq!(h.client.pending_counts().total(), 0);
    assert!(h.recorder.events().is_empty());
}
