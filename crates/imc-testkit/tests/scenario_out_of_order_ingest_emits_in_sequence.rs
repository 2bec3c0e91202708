//! Scenario: Out-of-order ingest still emits in sequence order
//!
//! # Invariants under test
//! - Emission order is ascending sequence number across both streams,
//!   whatever order messages were ingested in.
//! - Gaps in the diff sequence do not block emission.
//! - Diffs that arrive after their successors were emitted are dropped as
//!   stale, never emitted out of order.

use imc_client::{ClientState, IngestOutcome};
use imc_schemas::Pose;
use imc_testkit::{diff, snapshot, Harness};

// ---------------------------------------------------------------------------
// 1. Diffs 5, 3, 4 then snapshot 1
// ---------------------------------------------------------------------------

#[test]
fn diffs_before_snapshot_emit_after_it_in_order() {
    let h = Harness::default();
    for seq in [5, 3, 4] {
        h.client.ingest_diff(diff(seq, "m", "base")).unwrap();
    }
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();

    let report = h.client.advance();

    assert_eq!(h.recorder.emitted_seqs(), vec![1, 3, 4, 5]);
    assert_eq!(report.emitted_snapshots, 1);
    assert_eq!(report.emitted_diffs, 3);
    assert_eq!(h.client.pending_counts().total(), 0);
}

// ---------------------------------------------------------------------------
// 2. Blocked frames hold back everything behind them
// ---------------------------------------------------------------------------

#[test]
fn a_blocked_diff_holds_back_later_diffs() {
    let h = Harness::default();
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();

    h.client.ingest_diff(diff(3, "m", "base")).unwrap();
    h.client.ingest_diff(diff(2, "m", "gripper")).unwrap();
    h.client.advance();
    assert_eq!(h.recorder.emitted_seqs(), vec![1]);
    assert_eq!(h.client.pending_counts().diffs, 2);

    h.tree.set_transform("base", "gripper", Pose::from_translation(0.0, 0.0, 0.5));
    h.client.advance();
    assert_eq!(h.recorder.emitted_seqs(), vec![1, 2, 3]);
}

#[test]
fn emission_order_is_non_decreasing_for_shuffled_arrivals() {
    let arrivals: [&[u64]; 4] = [
        &[9, 2, 7, 4, 3, 8, 6, 5],
        &[2, 3, 4, 5, 6, 7, 8, 9],
        &[9, 8, 7, 6, 5, 4, 3, 2],
        &[5, 9, 2, 2, 8, 5, 3, 3],
    ];
    for order in arrivals {
        let h = Harness::default();
        for (i, seq) in order.iter().enumerate() {
            h.client.ingest_diff(diff(*seq, "m", "base")).unwrap();
            if i == order.len() / 2 {
                h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
            }
            h.client.advance();
        }
        let seqs = h.recorder.emitted_seqs();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "order {order:?} emitted {seqs:?}");
        assert_eq!(seqs.first(), Some(&1));
    }
}

// ---------------------------------------------------------------------------
// 3. Late diffs below the emitted head are stale
// ---------------------------------------------------------------------------

#[test]
fn late_lower_diff_is_dropped_not_emitted() {
    let h = Harness::default();
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.ingest_diff(diff(4, "m", "base")).unwrap();
    h.client.advance();
    assert_eq!(h.client.state(), ClientState::Receiving);

    assert_eq!(
        h.client.ingest_diff(diff(3, "m", "base")).unwrap(),
        IngestOutcome::Duplicate
    );
    h.client.advance();
    assert_eq!(h.recorder.emitted_seqs(), vec![1, 4]);
}
