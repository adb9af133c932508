//! Scheduler error taxonomy.
//!
//! Every variant is recoverable: the loop logs it, backs off, and tries
//! again next cycle. Nothing here ever terminates the loop.

use thiserror::Error;

use gleaner_game::GameError;

#[derive(Debug, Error)]
pub enum SchedError {
    /// Selection yielded nothing this cycle.
    #[error("no viable target this cycle")]
    NoTarget,

    /// No worker has usable capacity after reservations and commitments.
    #[error("no worker has usable capacity")]
    NoCapacity,

    /// The target cannot be batched: nothing to extract, or the snapshot
    /// carries inconsistent per-thread constants.
    #[error("plan infeasible: {0}")]
    PlanInfeasible(String),

    /// A game call failed outright (snapshot, discovery).
    #[error(transparent)]
    Game(#[from] GameError),
}
