//! Throughput counters for one accumulator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::RunState;

/// Lock-free counters updated from the worker, read from any thread.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    received: AtomicU64,
    dispatched: AtomicU64,
    discarded: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl StatsRecorder {
    /// Count a new cycle and return its 1-based number.
    pub fn next_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, discarded: usize) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        self.discarded.fetch_add(discarded as u64, Ordering::Relaxed);
    }

    /// Messages dropped undelivered because the accumulator was stopping.
    pub fn record_dropped(&self, dropped: usize) {
        self.discarded.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn mark_started(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Utc::now());
        }
    }

    pub fn snapshot(&self, state: RunState, pending: usize) -> AccumulatorStats {
        AccumulatorStats {
            state,
            pending,
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            started_at: self.started_at.lock().ok().and_then(|s| *s),
        }
    }
}

/// JSON-serializable point-in-time view of an accumulator.
#[derive(Debug, Clone, Serialize)]
pub struct AccumulatorStats {
    pub state: RunState,
    /// Messages currently held in the batch.
    pub pending: usize,
    /// Cycles started, including failed ones.
    pub cycles: u64,
    pub failed_cycles: u64,
    /// Messages taken from the source.
    pub received: u64,
    /// Messages the sink accepted.
    pub dispatched: u64,
    /// Messages dropped by abandoned cycles or by a stop.
    pub discarded: u64,
    /// When the accumulator was last started.
    pub started_at: Option<DateTime<Utc>>,
}
