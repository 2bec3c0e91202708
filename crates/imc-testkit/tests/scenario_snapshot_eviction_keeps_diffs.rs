//! Scenario: A newer snapshot evicts older snapshots only
//!
//! # Invariants under test
//! - Snapshot N discards queued snapshots with sequence number < N.
//! - Queued diffs are untouched by snapshot eviction.
//! - An older snapshot arriving after a newer one is superseded on arrival.

use imc_client::{IngestOutcome, Stream};
use imc_schemas::Pose;
use imc_testkit::{diff, snapshot, Harness};

#[test]
fn newer_snapshot_evicts_older_but_not_diffs() {
    let h = Harness::default();
    // Unresolvable so nothing is emitted while we look at the queues.
    h.client.ingest_snapshot(snapshot(2, &[("m", "camera")])).unwrap();
    h.client.ingest_snapshot(snapshot(4, &[("m", "camera")])).unwrap();
    for seq in [1, 3, 5, 6] {
        h.client.ingest_diff(diff(seq, "m", "base")).unwrap();
    }
    h.client.ingest_snapshot(snapshot(5, &[("m", "camera")])).unwrap();

    assert_eq!(h.client.pending_sequence_numbers(Stream::Snapshot), vec![5]);
    assert_eq!(h.client.pending_sequence_numbers(Stream::Diff), vec![1, 3, 5, 6]);
}

#[test]
fn older_snapshot_after_newer_is_superseded() {
    let h = Harness::default();
    h.client.ingest_snapshot(snapshot(8, &[("m", "camera")])).unwrap();
    assert_eq!(
        h.client.ingest_snapshot(snapshot(3, &[("m", "base")])).unwrap(),
        IngestOutcome::Superseded
    );
    assert_eq!(h.client.pending_sequence_numbers(Stream::Snapshot), vec![8]);
}

#[test]
fn bootstrap_uses_the_newest_snapshot() {
    let h = Harness::default();
    h.client.ingest_snapshot(snapshot(2, &[("m", "camera")])).unwrap();
    h.client.ingest_diff(diff(3, "m", "base")).unwrap();
    h.client.ingest_snapshot(snapshot(4, &[("m", "camera")])).unwrap();
    h.client.ingest_diff(diff(5, "m", "base")).unwrap();

    h.tree.set_transform("map", "camera", Pose::from_translation(0.0, 2.0, 1.0));
    let report = h.client.advance();

    assert_eq!(h.recorder.emitted_seqs(), vec![4, 5]);
    assert_eq!(report.folded_diffs, 1);
    let full = h.recorder.last_full_update().unwrap();
    assert_eq!(full.markers[0].header.frame_id, "map");
    assert!(full.markers[0]
        .pose
        .approx_eq(&Pose::from_translation(0.0, 2.0, 1.0), 1e-9));
}
