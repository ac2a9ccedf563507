use physics::EnvError;
use thiserror::Error;

/// Errors surfaced by agents and the training loop.
#[derive(Debug, Error)]
pub enum RlError {
    /// The environment rejected an action.
    #[error(transparent)]
    Env(#[from] EnvError),
    /// A checkpoint does not fit the agent it is loaded into.
    #[error("checkpoint mismatch: {0}")]
    Checkpoint(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A gradient update failed.
    #[error("update failed: {0:#}")]
    Update(#[from] anyhow::Error),
}
