//! Optimistic ledger of capacity committed to in-flight batches.
//!
//! Remote units never report completion, so the only release signal is time:
//! each commitment carries the instant the launched stages are expected to
//! have finished, and [`CommitmentLedger::purge`] drops it once that instant
//! passes, whether or not the remote unit actually finished. This keeps one
//! cycle from double-booking capacity it just handed out, and nothing more.

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

/// Capacity committed to one batch on one worker.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub batch_id: Uuid,
    pub capacity: f64,
    pub free_at: Instant,
}

/// Per-worker record of committed-but-unconfirmed capacity.
#[derive(Debug, Default)]
pub struct CommitmentLedger {
    entries: HashMap<String, Vec<Commitment>>,
}

impl CommitmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record capacity handed to a batch on `worker`, expected back at `free_at`.
    pub fn commit(&mut self, worker: &str, batch_id: Uuid, capacity: f64, free_at: Instant) {
        self.entries
            .entry(worker.to_string())
            .or_default()
            .push(Commitment {
                batch_id,
                capacity,
                free_at,
            });
    }

    /// Drop every commitment whose expected free time has passed.
    pub fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, commitments| {
            commitments.retain(|c| c.free_at > now);
            !commitments.is_empty()
        });
    }

    /// Total still-committed capacity per worker at `now`.
    ///
    /// Entries past their free time count as released even before the next
    /// [`purge`](Self::purge).
    pub fn committed_by_worker(&self, now: Instant) -> HashMap<String, f64> {
        self.entries
            .iter()
            .filter_map(|(worker, commitments)| {
                let total: f64 = commitments
                    .iter()
                    .filter(|c| c.free_at > now)
                    .map(|c| c.capacity)
                    .sum();
                if total > 0.0 {
                    Some((worker.clone(), total))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of live commitment entries across all workers.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn commit_shows_up_in_totals() {
        let mut ledger = CommitmentLedger::new();
        let now = Instant::now();
        let batch = Uuid::new_v4();

        ledger.commit("w1", batch, 10.0, now + Duration::from_secs(5));
        ledger.commit("w1", batch, 4.0, now + Duration::from_secs(5));
        ledger.commit("w2", batch, 2.0, now + Duration::from_secs(5));

        let committed = ledger.committed_by_worker(now);
        assert_eq!(committed["w1"], 14.0);
        assert_eq!(committed["w2"], 2.0);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn stale_commitments_are_purged() {
        let mut ledger = CommitmentLedger::new();
        let now = Instant::now();

        ledger.commit("w1", Uuid::new_v4(), 8.0, now + Duration::from_millis(10));
        ledger.commit("w1", Uuid::new_v4(), 4.0, now + Duration::from_secs(60));

        // Past the first commitment's free time, before the second's.
        let later = now + Duration::from_millis(20);
        ledger.purge(later);

        assert_eq!(ledger.len(), 1);
        let committed = ledger.committed_by_worker(later);
        assert_eq!(committed["w1"], 4.0);
    }

    #[test]
    fn expired_entries_do_not_count_even_before_purge() {
        let mut ledger = CommitmentLedger::new();
        let now = Instant::now();

        ledger.commit("w1", Uuid::new_v4(), 8.0, now + Duration::from_millis(10));

        let later = now + Duration::from_secs(1);
        // No purge() call; totals must still treat the entry as released.
        assert!(ledger.committed_by_worker(later).is_empty());
    }

    #[test]
    fn purge_removes_empty_workers() {
        let mut ledger = CommitmentLedger::new();
        let now = Instant::now();

        ledger.commit("w1", Uuid::new_v4(), 8.0, now + Duration::from_millis(1));
        ledger.purge(now + Duration::from_secs(1));

        assert!(ledger.is_empty());
    }
}
