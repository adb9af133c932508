//! In-memory game backend for tests and the `gleaner` binary.
//!
//! Models just enough of the game to exercise the scheduler: a fixed set of
//! worker nodes with finite capacity, a set of target snapshots, and a launch
//! log. Launches that exceed a worker's free capacity are rejected, which is
//! exactly how the optimistic capacity model's over-commits become visible.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use gleaner_core::config::SimConfig;
use gleaner_core::{LaunchId, StageKind, TargetSnapshot, WorkerNode};

use crate::api::GameApi;
use crate::error::GameError;

/// Slack for float comparison when checking capacity fits.
const CAPACITY_EPSILON: f64 = 1e-9;

/// One recorded remote launch.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub id: LaunchId,
    pub worker: String,
    pub stage: StageKind,
    pub target: String,
    pub threads: u32,
    pub start_offset: Duration,
}

#[derive(Debug)]
struct SimWorker {
    node: WorkerNode,
    /// When set, every launch on this worker is rejected.
    failing: bool,
}

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order is preserved: `list_workers` must be stable so the
    /// dispatcher's greedy walk is deterministic.
    workers: Vec<SimWorker>,
    targets: HashMap<String, TargetSnapshot>,
    launches: Vec<LaunchRecord>,
    next_launch_id: LaunchId,
}

/// In-memory world implementing [`GameApi`].
pub struct SimWorld {
    inner: Mutex<Inner>,
    /// Capacity units one thread occupies on a worker (the remote runner's
    /// footprint, shared knowledge between game and scheduler).
    cost_per_thread: f64,
}

impl SimWorld {
    /// Empty world.
    pub fn new(cost_per_thread: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_launch_id: 1,
                ..Inner::default()
            }),
            cost_per_thread,
        }
    }

    /// Build a world from the `[sim]` config tables.
    pub fn from_config(config: &SimConfig, cost_per_thread: f64) -> Self {
        let mut inner = Inner {
            next_launch_id: 1,
            ..Inner::default()
        };
        for w in &config.workers {
            inner.workers.push(SimWorker {
                node: WorkerNode {
                    name: w.name.clone(),
                    total_capacity: w.total_capacity,
                    used_capacity: w.used_capacity,
                    is_primary: w.is_primary,
                },
                failing: false,
            });
        }
        for t in &config.targets {
            inner.targets.insert(
                t.name.clone(),
                TargetSnapshot {
                    name: t.name.clone(),
                    current_value: t.current_value,
                    max_value: t.max_value,
                    current_security: t.current_security,
                    min_security: t.min_security,
                    extract_time: Duration::from_millis(t.extract_ms),
                    replenish_time: Duration::from_millis(t.replenish_ms),
                    soften_time: Duration::from_millis(t.soften_ms),
                    yield_per_thread: t.yield_per_thread,
                    growth_per_thread: t.growth_per_thread,
                    extract_security_delta: t.extract_security_delta,
                    replenish_security_delta: t.replenish_security_delta,
                    soften_security_decrease: t.soften_security_decrease,
                },
            );
        }
        Self {
            inner: Mutex::new(inner),
            cost_per_thread,
        }
    }

    /// Add a worker node.
    pub async fn add_worker(&self, node: WorkerNode) {
        self.inner.lock().await.workers.push(SimWorker {
            node,
            failing: false,
        });
    }

    /// Add (or replace) a target snapshot.
    pub async fn add_target(&self, snapshot: TargetSnapshot) {
        self.inner
            .lock()
            .await
            .targets
            .insert(snapshot.name.clone(), snapshot);
    }

    /// Make every launch on `worker` fail (or succeed again).
    pub async fn set_worker_failing(&self, worker: &str, failing: bool) {
        let mut inner = self.inner.lock().await;
        if let Some(w) = inner.workers.iter_mut().find(|w| w.node.name == worker) {
            w.failing = failing;
        }
    }

    /// Return capacity to a worker, as if its remote units finished.
    pub async fn release(&self, worker: &str, amount: f64) {
        let mut inner = self.inner.lock().await;
        if let Some(w) = inner.workers.iter_mut().find(|w| w.node.name == worker) {
            w.node.used_capacity = (w.node.used_capacity - amount).max(0.0);
        }
    }

    /// All launches recorded so far, in launch order.
    pub async fn launches(&self) -> Vec<LaunchRecord> {
        self.inner.lock().await.launches.clone()
    }

    /// Number of launches recorded so far.
    pub async fn launch_count(&self) -> usize {
        self.inner.lock().await.launches.len()
    }
}

#[async_trait]
impl GameApi for SimWorld {
    async fn list_workers(&self) -> Result<Vec<WorkerNode>, GameError> {
        let inner = self.inner.lock().await;
        Ok(inner.workers.iter().map(|w| w.node.clone()).collect())
    }

    async fn target_snapshot(&self, name: &str) -> Result<TargetSnapshot, GameError> {
        let inner = self.inner.lock().await;
        inner
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| GameError::TargetUnavailable(name.to_string()))
    }

    async fn launch_remote(
        &self,
        worker: &str,
        stage: StageKind,
        target: &str,
        threads: u32,
        start_offset: Duration,
    ) -> Result<LaunchId, GameError> {
        let mut inner = self.inner.lock().await;

        let slot = inner
            .workers
            .iter_mut()
            .find(|w| w.node.name == worker)
            .ok_or_else(|| GameError::UnknownWorker(worker.to_string()))?;

        if slot.failing {
            return Err(GameError::LaunchRejected {
                worker: worker.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let required = threads as f64 * self.cost_per_thread;
        if required > slot.node.free_capacity() + CAPACITY_EPSILON {
            return Err(GameError::LaunchRejected {
                worker: worker.to_string(),
                reason: format!(
                    "insufficient capacity: need {required:.2}, free {:.2}",
                    slot.node.free_capacity()
                ),
            });
        }

        slot.node.used_capacity += required;

        let id = inner.next_launch_id;
        inner.next_launch_id += 1;
        debug!(
            id,
            worker = %worker,
            stage = %stage,
            target = %target,
            threads,
            offset_ms = start_offset.as_millis() as u64,
            "sim launch"
        );
        inner.launches.push(LaunchRecord {
            id,
            worker: worker.to_string(),
            stage,
            target: target.to_string(),
            threads,
            start_offset,
        });
        Ok(id)
    }
}
