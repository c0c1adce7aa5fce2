//! Error taxonomy for the orchestrator

use thiserror::Error;

/// Result type for orchestrator operations
pub type HookResult<T> = Result<T, HookError>;

#[derive(Debug, Error)]
pub enum HookError {
    /// Invalid hook definition; fatal for the affected hook only
    #[error("Definition error: {0}")]
    Definition(String),

    /// Predicate raised or returned garbage
    #[error("Predicate error: {0}")]
    Predicate(String),

    #[error(transparent)]
    Graph(#[from] khor_graph::GraphError),

    #[error(transparent)]
    Workflow(#[from] khor_workflow::WorkflowError),

    #[error(transparent)]
    Git(#[from] khor_git::GitError),

    #[error(transparent)]
    Config(#[from] khor_config::ConfigError),

    /// Pending-evaluation queue is at capacity
    #[error("Evaluation queue full")]
    QueueFull,

    #[error("Evaluation timed out")]
    Timeout,

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Hook not found: {0}")]
    UnknownHook(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Receipt signing failed: {0}")]
    Signing(String),
}

impl From<std::io::Error> for HookError {
    fn from(err: std::io::Error) -> Self {
        HookError::Io(err.to_string())
    }
}
