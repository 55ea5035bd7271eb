//! Crate-wide error taxonomy (§7 of the design — one enum per failure class
//! a caller needs to branch on; everything else flows through `anyhow`).

use std::path::PathBuf;
use thiserror::Error;

pub type KdResult<T> = std::result::Result<T, KdError>;

/// Top-level error type returned by the public contracts in this crate.
///
/// Operational errors (missing files, illegal state transitions) are meant
/// to reach the user; transient conditions (timeouts, contention) are meant
/// to be handled by the caller and usually don't escape the harness loop.
#[derive(Debug, Error)]
pub enum KdError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task id collision: {0}")]
    TaskIdCollision(String),

    #[error("illegal task transition: {from:?} -> {to:?}")]
    IllegalTaskTransition { from: String, to: String },

    #[error("thread not found: {branch}/{thread}")]
    ThreadNotFound { branch: String, thread: String },

    #[error("thread already exists: {branch}/{thread}")]
    ThreadAlreadyExists { branch: String, thread: String },

    #[error("message append contended after {attempts} attempts in {branch}/{thread}")]
    Contended {
        branch: String,
        thread: String,
        attempts: u32,
    },

    #[error("branch name normalizes to an existing slug collision: {0}")]
    SlugCollision(String),

    #[error("agent binary missing: {0}")]
    AgentMissing(String),

    #[error("agent exited non-zero: {backend} (stderr: {stderr})")]
    AgentFailed { backend: String, stderr: String },

    #[error("agent timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    #[error("session already active for task {task_id} (pid {pid})")]
    TaskAlreadyClaimed { task_id: String, pid: u32 },

    #[error("hand-mode session already active: {session}")]
    HandModeCollision { session: String },

    #[error("wrong git branch: expected {expected}, found {actual}")]
    WrongBranch { expected: String, actual: String },

    #[error("unknown configuration key: {0}")]
    UnknownConfigKey(String),

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KdError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KdError::Io {
            path: path.into(),
            source,
        }
    }
}
