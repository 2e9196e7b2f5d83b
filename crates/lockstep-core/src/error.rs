//! Errors surfaced by the simulation to its host.

use thiserror::Error;

/// Session-level failures.
///
/// Per-entity problems during order dispatch never become a `SimError`;
/// they are logged and the entity is skipped.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("startup failed: {0}")]
    Startup(String),
    #[error("turn batch {batch} is outside the pipeline (depth {depth})")]
    BatchOutOfRange { batch: usize, depth: usize },
    #[error("turn length must be positive")]
    InvalidTurnLength,
    #[error("at least one turn per frame must be allowed")]
    InvalidTurnBudget,
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
