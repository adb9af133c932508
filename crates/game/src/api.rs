//! The slice of the game's scripting surface the scheduler consumes.
//!
//! Everything here is fire-and-forget: a launched remote unit delays by its
//! start offset, acts once, and never reports back. Backends (the live game
//! or [`crate::sim::SimWorld`]) implement these traits so the scheduling core
//! never links against game internals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use gleaner_core::{LaunchId, StageKind, TargetSnapshot, WorkerNode};

use crate::error::GameError;

/// Remote-execution and discovery calls against the running game.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Enumerate every worker node currently reachable, in a stable order.
    async fn list_workers(&self) -> Result<Vec<WorkerNode>, GameError>;

    /// Read-only snapshot of a target pool.
    ///
    /// Fails with [`GameError::TargetUnavailable`] when the target is
    /// unreachable or privilege has not been acquired yet.
    async fn target_snapshot(&self, name: &str) -> Result<TargetSnapshot, GameError>;

    /// Launch `threads` of `stage` against `target` on `worker`.
    ///
    /// The remote unit sleeps for `start_offset` before acting so that
    /// stages dispatched together still complete in their planned order.
    /// A rejected launch returns [`GameError::LaunchRejected`]; the caller
    /// must not retry within the same dispatch pass.
    async fn launch_remote(
        &self,
        worker: &str,
        stage: StageKind,
        target: &str,
        threads: u32,
        start_offset: Duration,
    ) -> Result<LaunchId, GameError>;
}

/// Blanket implementation so `Arc<dyn GameApi>` can be used directly.
#[async_trait]
impl<T: GameApi + ?Sized> GameApi for Arc<T> {
    async fn list_workers(&self) -> Result<Vec<WorkerNode>, GameError> {
        (**self).list_workers().await
    }

    async fn target_snapshot(&self, name: &str) -> Result<TargetSnapshot, GameError> {
        (**self).target_snapshot(name).await
    }

    async fn launch_remote(
        &self,
        worker: &str,
        stage: StageKind,
        target: &str,
        threads: u32,
        start_offset: Duration,
    ) -> Result<LaunchId, GameError> {
        (**self)
            .launch_remote(worker, stage, target, threads, start_offset)
            .await
    }
}

/// Picks the target to batch against this cycle.
///
/// Scoring policy is the selector's own business; the loop only needs a name.
#[async_trait]
pub trait TargetSelector: Send + Sync {
    /// Pick the best candidate, or `None` when nothing is viable right now.
    async fn select_target(
        &self,
        api: &dyn GameApi,
        candidates: &[String],
    ) -> Result<Option<String>, GameError>;
}
