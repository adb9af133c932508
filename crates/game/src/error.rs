use thiserror::Error;

/// Errors surfaced by a game backend.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("target unreachable or not privileged: {0}")]
    TargetUnavailable(String),

    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("launch rejected on {worker}: {reason}")]
    LaunchRejected { worker: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}
