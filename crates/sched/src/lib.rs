pub mod capacity;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod runner;
pub mod stats;

pub use capacity::{capacity_snapshot, usable_capacity, ReservePolicy, WorkerCapacity};
pub use dispatcher::{DispatchOutcome, Dispatcher, StageOutcome, WorkerCommitment};
pub use error::SchedError;
pub use ledger::{Commitment, CommitmentLedger};
pub use planner::{plan_batch, BatchPlan, PlannedStage};
pub use runner::Runner;
pub use stats::{RunnerStats, StatsSnapshot};
