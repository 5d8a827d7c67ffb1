//! Error types for the simulation API.
//!
//! Expected gameplay outcomes (unreachable goal, empty grid) are not errors;
//! they surface as empty paths. `SimError` covers misconfiguration and
//! host API misuse.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid navigation grid: {0}")]
    InvalidGrid(String),
    #[error("no agent with id {0}")]
    UnknownAgent(u32),
    #[error("agent {0} does not navigate the grid")]
    NotNavigating(u32),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
