//! The scheduling loop.
//!
//! One cycle: pick a target, snapshot worker capacity net of in-flight
//! commitments, size a batch, dispatch it, then sleep until the batch should
//! have landed. Recoverable conditions (no target, no capacity, infeasible
//! plan, game hiccups) park the loop for a short backoff instead. The loop
//! never terminates on an error, only on shutdown or the batch limit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use gleaner_core::config::SchedulerConfig;
use gleaner_game::{GameApi, TargetSelector};

use crate::capacity::{capacity_snapshot, ReservePolicy};
use crate::dispatcher::Dispatcher;
use crate::error::SchedError;
use crate::ledger::CommitmentLedger;
use crate::planner::plan_batch;
use crate::stats::RunnerStats;

pub struct Runner {
    api: Arc<dyn GameApi>,
    selector: Arc<dyn TargetSelector>,
    config: SchedulerConfig,
    dispatcher: Dispatcher,
    shutdown: Arc<Notify>,
    stats: Arc<RunnerStats>,
}

impl Runner {
    pub fn new(
        api: Arc<dyn GameApi>,
        selector: Arc<dyn TargetSelector>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(config.cost_per_thread);
        Self {
            api,
            selector,
            config,
            dispatcher,
            shutdown: Arc::new(Notify::new()),
            stats: Arc::new(RunnerStats::new()),
        }
    }

    /// Handle for stopping the loop from another task (signal handler, tests).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<RunnerStats> {
        self.stats.clone()
    }

    /// Drive cycles until shutdown is notified or the batch limit is hit.
    pub async fn run(&self) {
        let mut ledger = CommitmentLedger::new();
        let mut dispatched: u64 = 0;
        info!(targets = ?self.config.targets, batch_limit = ?self.config.batch_limit,
            "scheduler loop starting");

        loop {
            if let Some(limit) = self.config.batch_limit {
                if dispatched >= limit {
                    info!(dispatched, "batch limit reached, stopping");
                    break;
                }
            }

            self.stats.record_cycle();
            let sleep_for = match self.cycle(&mut ledger).await {
                Ok(sleep) => {
                    dispatched += 1;
                    sleep
                }
                Err(err) => {
                    self.stats.record_idle();
                    match &err {
                        // Idle, not broken: nothing worth batching right now.
                        SchedError::NoTarget | SchedError::NoCapacity => {
                            debug!(reason = %err, "idle cycle")
                        }
                        SchedError::PlanInfeasible(_) => warn!(error = %err, "skipping target"),
                        SchedError::Game(_) => warn!(error = %err, "game call failed"),
                    }
                    self.config.idle_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            cycles = stats.cycles,
            batches = stats.batches_dispatched,
            partial = stats.partial_batches,
            launch_failures = stats.launch_failures,
            idle = stats.idle_cycles,
            "scheduler loop stopped"
        );
    }

    /// One planning/dispatch cycle. Returns the sleep before the next cycle.
    async fn cycle(&self, ledger: &mut CommitmentLedger) -> Result<Duration, SchedError> {
        let now = Instant::now();
        ledger.purge(now);

        let target_name = self
            .selector
            .select_target(self.api.as_ref(), &self.config.targets)
            .await?
            .ok_or(SchedError::NoTarget)?;
        let target = self.api.target_snapshot(&target_name).await?;

        let workers = self.api.list_workers().await?;
        if workers.is_empty() {
            return Err(SchedError::NoCapacity);
        }

        let policy = ReservePolicy {
            primary_floor: self.config.primary_reserve,
            secondary_fraction: self.config.secondary_reserve_fraction,
        };
        let committed = ledger.committed_by_worker(now);
        let mut capacity = capacity_snapshot(
            &workers,
            &policy,
            &committed,
            self.config.min_worker_capacity,
        );
        if capacity.is_empty() {
            return Err(SchedError::NoCapacity);
        }

        let plan = plan_batch(&target, self.config.extract_fraction, self.config.stage_gap())?;
        let outcome = self
            .dispatcher
            .dispatch(self.api.as_ref(), &mut capacity, &plan)
            .await;
        if outcome.threads_launched() == 0 {
            // Nothing fit, or every launch was rejected.
            return Err(SchedError::NoCapacity);
        }

        let sleep = plan.total_duration + self.config.cycle_margin();
        let free_at = Instant::now() + sleep;
        for commitment in &outcome.commitments {
            ledger.commit(
                &commitment.worker,
                outcome.batch_id,
                commitment.capacity,
                free_at,
            );
        }

        self.stats
            .record_batch(outcome.partial(), outcome.launch_failures() as u64);
        info!(
            target = %target_name,
            batch = %outcome.batch_id,
            threads = outcome.threads_launched(),
            partial = outcome.partial(),
            expected_yield = outcome.estimated_yield,
            batch_ms = plan.total_duration.as_millis() as u64,
            "batch in flight"
        );
        Ok(sleep)
    }
}
