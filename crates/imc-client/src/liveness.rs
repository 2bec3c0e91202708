//! Liveness record for stall detection.
//!
//! Tracks the last emitted sequence number and when it was emitted. Used
//! only to decide whether the keep-alive window has elapsed; it never gates
//! ordering or deduplication.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LivenessRecord {
    last_emitted: Option<(u64, DateTime<Utc>)>,
    /// Client start or last reset.
    epoch_start: DateTime<Utc>,
}

impl LivenessRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_emitted: None,
            epoch_start: now,
        }
    }

    pub fn record_emission(&mut self, seq: u64, now: DateTime<Utc>) {
        self.last_emitted = Some((seq, now));
    }

    /// Forget all emissions and restart the epoch at `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.last_emitted = None;
        self.epoch_start = now;
    }

    pub fn last_emitted_seq(&self) -> Option<u64> {
        self.last_emitted.map(|(s, _)| s)
    }

    pub fn last_emitted_at(&self) -> Option<DateTime<Utc>> {
        self.last_emitted.map(|(_, t)| t)
    }

    /// Last time progress was made: the last emission, or the epoch start.
    pub fn last_progress_at(&self) -> DateTime<Utc> {
        match self.last_emitted {
            Some((_, t)) if t > self.epoch_start => t,
            _ => self.epoch_start,
        }
    }

    /// How long entries have been blocked, if the window has elapsed.
    ///
    /// The stall clock starts at the later of the last progress time and
    /// `oldest_pending` (when the oldest still-pending entry arrived), so an
    /// idle client that receives a fresh entry gets a full window.
    /// Returns `None` while within the window or when nothing is pending.
    pub fn expired(
        &self,
        now: DateTime<Utc>,
        oldest_pending: Option<DateTime<Utc>>,
        keep_alive: Duration,
    ) -> Option<Duration> {
        let oldest = oldest_pending?;
        let since = self.last_progress_at().max(oldest);
        let waited = now.signed_duration_since(since).to_std().ok()?;
        if waited > keep_alive {
            Some(waited)
        } else {
            None
        }
    }
}
