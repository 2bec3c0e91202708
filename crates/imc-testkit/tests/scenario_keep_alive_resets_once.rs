//! Scenario: Keep-alive expiry resets the client exactly once
//!
//! # Invariants under test
//! - While nothing resolves there is no emission.
//! - After the keep-alive window elapses exactly one error fires and both
//!   queues are empty.
//! - The window is only checked while entries are pending.
//! - Emissions restart the window.
//! - The reset reason names the blocking entry's failure and attempt count.

use imc_client::{ClientState, ResetReason};
use imc_testkit::{diff, snapshot, Harness, RecordedEvent};

#[test]
fn unresolvable_frames_expire_into_one_error() {
    let h = Harness::with_keep_alive(10);
    h.client.ingest_snapshot(snapshot(1, &[("m", "nowhere")])).unwrap();
    h.client.ingest_diff(diff(2, "m", "nowhere")).unwrap();
    h.client.ingest_diff(diff(3, "m", "nowhere")).unwrap();

    for _ in 0..10 {
        h.sleep(1);
        assert!(h.client.advance().reset.is_none());
    }
    assert!(h.recorder.emitted_seqs().is_empty());

    h.sleep(1);
    let report = h.client.advance();
    match report.reset {
        Some(ResetReason::KeepAliveExpired {
            snapshots_pending,
            diffs_pending,
            waiting_on,
            attempts,
            ..
        }) => {
            assert_eq!((snapshots_pending, diffs_pending), (1, 2));
            // One attempt per advance, the expiring one included.
            assert_eq!(attempts, 11);
            assert_eq!(waiting_on.map(|f| f.frame), Some("nowhere".to_string()));
        }
        other => panic!("expected keep-alive reset, got {other:?}"),
    }
    assert_eq!(h.client.pending_counts().total(), 0);
    assert_eq!(h.client.state(), ClientState::TransformError);

    for _ in 0..5 {
        h.sleep(30);
        h.client.advance();
    }
    assert_eq!(h.recorder.error_count(), 1);
    assert!(h.recorder.emitted_seqs().is_empty());
}

#[test]
fn idle_client_never_expires() {
    let h = Harness::with_keep_alive(1);
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();

    h.sleep(3_600);
    assert!(h.client.advance().reset.is_none());
    assert_eq!(h.client.state(), ClientState::Receiving);
}

#[test]
fn late_diff_after_idle_gets_a_full_window() {
    let h = Harness::with_keep_alive(5);
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();

    h.sleep(600);
    h.client.ingest_diff(diff(2, "m", "arm")).unwrap();
    h.sleep(4);
    assert!(h.client.advance().reset.is_none());
    h.sleep(2);
    assert!(h.client.advance().reset.is_some());
}

#[test]
fn steady_emission_keeps_the_client_alive() {
    let h = Harness::with_keep_alive(5);
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();
    for seq in 2..20 {
        h.client.ingest_diff(diff(seq, "m", "base")).unwrap();
        h.sleep(4);
        assert!(h.client.advance().reset.is_none());
    }
    assert!(!h.recorder.events().iter().any(RecordedEvent::is_error));
}
