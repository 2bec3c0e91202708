//! imc-runtime
//!
//! Tokio wiring around a [`SingleClient`]: a periodic `advance()` task and a
//! bounded ingest channel drained by a consumer task. The client itself is
//! runtime-agnostic; everything async lives here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use imc_client::SingleClient;
use imc_schemas::{DiffMessage, SnapshotMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default ingest channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Snapshot(SnapshotMessage),
    Diff(DiffMessage),
}

/// Producer side of the ingest channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct IngestChannel {
    tx: mpsc::Sender<Inbound>,
}

impl IngestChannel {
    pub async fn send_snapshot(&self, msg: SnapshotMessage) -> anyhow::Result<()> {
        self.tx
            .send(Inbound::Snapshot(msg))
            .await
            .context("ingest channel closed")
    }

    pub async fn send_diff(&self, msg: DiffMessage) -> anyhow::Result<()> {
        self.tx
            .send(Inbound::Diff(msg))
            .await
            .context("ingest channel closed")
    }

    /// Non-blocking send for transport callbacks running outside the runtime.
    /// Returns `false` when the channel is full or closed.
    pub fn try_send(&self, msg: Inbound) -> bool {
        self.tx.try_send(msg).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DriverStats {
    ingested: AtomicU64,
    rejected: AtomicU64,
    advances: AtomicU64,
    emitted: AtomicU64,
    resets: AtomicU64,
}

/// Point-in-time copy of [`DriverStats`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverCounters {
    pub ingested: u64,
    pub rejected: u64,
    pub advances: u64,
    pub emitted: u64,
    pub resets: u64,
}

impl DriverStats {
    pub fn snapshot(&self) -> DriverCounters {
        DriverCounters {
            ingested: self.ingested.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            advances: self.advances.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Spawn a task calling `client.advance()` every `interval` until `shutdown`
/// flips to `true`.
pub fn spawn_advance_loop(
    client: Arc<SingleClient>,
    interval: Duration,
    stats: Arc<DriverStats>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let report = client.advance();
            stats.advances.fetch_add(1, Ordering::Relaxed);
            stats
                .emitted
                .fetch_add(report.emitted() as u64, Ordering::Relaxed);

            if let Some(reason) = &report.reset {
                stats.resets.fetch_add(1, Ordering::Relaxed);
                warn!(server_id = client.server_id(), %reason, "client reset by driver tick");
            } else if report.emitted() > 0 {
                debug!(
                    server_id = client.server_id(),
                    snapshots = report.emitted_snapshots,
                    diffs = report.emitted_diffs,
                    folded = report.folded_diffs,
                    "advance"
                );
            }
        }
        debug!(server_id = client.server_id(), "advance loop stopped");
    })
}

/// Spawn a task feeding `rx` into the client until the channel closes or
/// `shutdown` flips to `true`.
pub fn spawn_ingest_consumer(
    client: Arc<SingleClient>,
    mut rx: mpsc::Receiver<Inbound>,
    stats: Arc<DriverStats>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                m = rx.recv() => m,
                _ = shutdown.changed() => None,
            };
            let Some(msg) = msg else { break };

            let result = match msg {
                Inbound::Snapshot(m) => client.ingest_snapshot(m),
                Inbound::Diff(m) => client.ingest_diff(m),
            };
            match result {
                Ok(_) => {
                    stats.ingested.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "inbound message rejected");
                }
            }
        }
        debug!(server_id = client.server_id(), "ingest consumer stopped");
    })
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Owns both tasks of a running driver.
#[derive(Debug)]
pub struct DriverHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<DriverStats>,
}

impl DriverHandle {
    pub fn stats(&self) -> DriverCounters {
        self.stats.snapshot()
    }

    /// Signal both tasks, wait for them, and return the final counters.
    pub async fn stop(self) -> anyhow::Result<DriverCounters> {
        let _ = self.shutdown.send(true);
        for t in self.tasks {
            t.await.context("driver task panicked")?;
        }
        Ok(self.stats.snapshot())
    }
}

/// Start a driver for `client`, ticking at the configured advance interval.
pub fn start(client: Arc<SingleClient>, capacity: usize) -> (IngestChannel, DriverHandle) {
    let interval = client.config().advance_interval();
    start_with_interval(client, capacity, interval)
}

pub fn start_with_interval(
    client: Arc<SingleClient>,
    capacity: usize,
    interval: Duration,
) -> (IngestChannel, DriverHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stats = Arc::new(DriverStats::default());

    info!(
        server_id = client.server_id(),
        interval_ms = interval.as_millis() as u64,
        capacity,
        "starting client driver"
    );

    let tasks = vec![
        spawn_ingest_consumer(client.clone(), rx, stats.clone(), shutdown_rx.clone()),
        spawn_advance_loop(client, interval, stats.clone(), shutdown_rx),
    ];
    (
        IngestChannel { tx },
        DriverHandle {
            shutdown: shutdown_tx,
            tasks,
            stats,
        },
    )
}
