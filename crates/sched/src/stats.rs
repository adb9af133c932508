//! In-process counters for the scheduling loop.
//!
//! Fire-and-forget dispatch means there is no completion signal to aggregate,
//! so these count what the loop itself did. Logged once at shutdown and
//! available to embedders via [`RunnerStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RunnerStats {
    cycles: AtomicU64,
    batches_dispatched: AtomicU64,
    partial_batches: AtomicU64,
    launch_failures: AtomicU64,
    idle_cycles: AtomicU64,
}

impl RunnerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, partial: bool, launch_failures: u64) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.partial_batches.fetch_add(1, Ordering::Relaxed);
        }
        self.launch_failures
            .fetch_add(launch_failures, Ordering::Relaxed);
    }

    pub(crate) fn record_idle(&self) {
        self.idle_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            partial_batches: self.partial_batches.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub batches_dispatched: u64,
    pub partial_batches: u64,
    pub launch_failures: u64,
    pub idle_cycles: u64,
}
