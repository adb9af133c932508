//! Maps a batch plan onto worker capacity and fires the launches.
//!
//! Stages go out in their completion order (soften-pre, replenish, extract,
//! soften-post). Each stage's threads are spread greedily across workers in
//! snapshot order, splitting a stage when one worker cannot hold all of it.
//! Launches are fire-and-forget; a stage that cannot be fully placed is
//! launched as far as capacity allows and reported as partial, never blocked
//! or rolled back. The next cycle re-plans from scratch.

use tracing::{debug, warn};
use uuid::Uuid;

use gleaner_game::{GameApi, GameError};

use crate::capacity::WorkerCapacity;
use crate::planner::{BatchPlan, PlannedStage};

/// How one stage fared during a dispatch pass.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub role: &'static str,
    pub requested: u32,
    /// Threads actually accepted by a worker.
    pub launched: u32,
    /// Threads lost to rejected launch calls (allocated, not retried).
    pub failed: u32,
}

impl StageOutcome {
    /// Threads that never ran: allocation shortfall plus rejected launches.
    pub fn shortfall(&self) -> u32 {
        self.requested - self.launched
    }
}

/// Capacity successfully placed on a worker during one pass, for the ledger.
#[derive(Debug, Clone)]
pub struct WorkerCommitment {
    pub worker: String,
    pub capacity: f64,
}

/// Result of dispatching one batch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub batch_id: Uuid,
    pub stages: Vec<StageOutcome>,
    pub commitments: Vec<WorkerCommitment>,
    /// Planned yield scaled by the extract stage's launched share.
    pub estimated_yield: f64,
}

impl DispatchOutcome {
    /// True when any stage could not be fully placed and launched.
    pub fn partial(&self) -> bool {
        self.stages.iter().any(|s| s.launched < s.requested)
    }

    pub fn threads_launched(&self) -> u32 {
        self.stages.iter().map(|s| s.launched).sum()
    }

    pub fn launch_failures(&self) -> u32 {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

/// Stateless stage-to-worker allocator.
pub struct Dispatcher {
    /// Capacity units one thread occupies.
    cost_per_thread: f64,
}

impl Dispatcher {
    pub fn new(cost_per_thread: f64) -> Self {
        Self { cost_per_thread }
    }

    /// Dispatch `plan` against `capacity`, consuming it in place.
    ///
    /// The snapshot is this pass's only budget: every allocated thread is
    /// deducted, including ones whose launch call is then rejected, so a
    /// flaky worker cannot be re-offered within the same pass.
    pub async fn dispatch(
        &self,
        api: &dyn GameApi,
        capacity: &mut [WorkerCapacity],
        plan: &BatchPlan,
    ) -> DispatchOutcome {
        let batch_id = Uuid::new_v4();
        let mut stages = Vec::with_capacity(4);
        let mut commitments: Vec<WorkerCommitment> = Vec::new();

        for stage in plan.stages() {
            let outcome = self
                .dispatch_stage(api, capacity, &plan.target, stage, batch_id, &mut commitments)
                .await;
            stages.push(outcome);
        }

        let extract = stages
            .iter()
            .find(|s| s.role == "extract")
            .map(|s| (s.launched, s.requested))
            .unwrap_or((0, 1));
        let estimated_yield = plan.expected_yield * extract.0 as f64 / extract.1.max(1) as f64;

        let outcome = DispatchOutcome {
            batch_id,
            stages,
            commitments,
            estimated_yield,
        };
        debug!(
            batch = %batch_id,
            target = %plan.target,
            threads = outcome.threads_launched(),
            partial = outcome.partial(),
            "batch dispatched"
        );
        outcome
    }

    async fn dispatch_stage(
        &self,
        api: &dyn GameApi,
        capacity: &mut [WorkerCapacity],
        target: &str,
        stage: &PlannedStage,
        batch_id: Uuid,
        commitments: &mut Vec<WorkerCommitment>,
    ) -> StageOutcome {
        let mut remaining = stage.threads;
        let mut launched = 0u32;
        let mut failed = 0u32;

        for worker in capacity.iter_mut() {
            if remaining == 0 {
                break;
            }
            let fit = (worker.usable / self.cost_per_thread).floor() as u32;
            if fit == 0 {
                continue;
            }

            let run = fit.min(remaining);
            worker.usable -= run as f64 * self.cost_per_thread;
            remaining -= run;

            match api
                .launch_remote(&worker.name, stage.kind, target, run, stage.start_offset)
                .await
            {
                Ok(id) => {
                    debug!(
                        batch = %batch_id,
                        launch = id,
                        worker = %worker.name,
                        role = stage.role,
                        threads = run,
                        offset_ms = stage.start_offset.as_millis() as u64,
                        "stage slice launched"
                    );
                    launched += run;
                    record_commitment(commitments, &worker.name, run as f64 * self.cost_per_thread);
                }
                Err(GameError::LaunchRejected { worker: w, reason }) => {
                    warn!(batch = %batch_id, worker = %w, role = stage.role, threads = run, %reason,
                        "launch rejected");
                    failed += run;
                }
                Err(e) => {
                    warn!(batch = %batch_id, worker = %worker.name, role = stage.role, error = %e,
                        "launch failed");
                    failed += run;
                }
            }
        }

        if remaining > 0 {
            warn!(
                batch = %batch_id,
                target = %target,
                role = stage.role,
                short = remaining,
                "stage under-allocated, proceeding without it"
            );
        }

        StageOutcome {
            role: stage.role,
            requested: stage.threads,
            launched,
            failed,
        }
    }
}

fn record_commitment(commitments: &mut Vec<WorkerCommitment>, worker: &str, capacity: f64) {
    if let Some(existing) = commitments.iter_mut().find(|c| c.worker == worker) {
        existing.capacity += capacity;
    } else {
        commitments.push(WorkerCommitment {
            worker: worker.to_string(),
            capacity,
        });
    }
}
