//! Scenario: Initialization timing
//!
//! # Invariants under test
//! - `is_initialized()` is false until the lowest snapshot is resolved and
//!   emitted and no lower diff remains unaccounted for.
//! - It becomes true within the same `advance()` and stays true, including
//!   across a later reset.

use imc_client::ClientState;
use imc_schemas::Pose;
use imc_testkit::{diff, snapshot, Harness};

#[test]
fn not_initialized_until_snapshot_emitted() {
    let h = Harness::default();
    assert!(!h.client.is_initialized());

    h.client.ingest_diff(diff(2, "m", "base")).unwrap();
    h.client.advance();
    assert!(!h.client.is_initialized());

    h.client.ingest_snapshot(snapshot(1, &[("m", "lidar")])).unwrap();
    h.client.advance();
    assert!(!h.client.is_initialized());
    assert!(h.recorder.emitted_seqs().is_empty());

    h.tree.set_transform("base", "lidar", Pose::IDENTITY);
    h.client.advance();
    assert!(h.client.is_initialized());
    assert_eq!(h.recorder.emitted_seqs(), vec![1, 2]);
}

#[test]
fn status_change_follows_the_full_update() {
    let h = Harness::default();
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();
    assert_eq!(h.recorder.states(), vec![ClientState::Receiving]);
    assert_eq!(h.recorder.emitted_seqs(), vec![1]);
}

#[test]
fn stays_initialized_across_reset() {
    let h = Harness::with_keep_alive(2);
    h.client.ingest_snapshot(snapshot(1, &[("m", "base")])).unwrap();
    h.client.advance();
    assert!(h.client.is_initialized());

    h.client.ingest_diff(diff(2, "m", "nowhere")).unwrap();
    h.sleep(3);
    h.client.advance();
    assert_eq!(h.client.state(), ClientState::TransformError);
    assert!(h.client.is_initialized());
}
