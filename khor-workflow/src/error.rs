//! Error types and per-step results

use serde::Serialize;
use thiserror::Error;

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Invalid pipeline or step description; fatal at load time
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    /// `dependsOn` edges form a cycle
    #[error("Dependency cycle in pipeline {pipeline}")]
    Cycle { pipeline: String },

    #[error("Step {step} missing required config field {field}")]
    MissingConfig { step: String, field: String },

    #[error(transparent)]
    Graph(#[from] khor_graph::GraphError),

    #[error(transparent)]
    Template(#[from] khor_template::TemplateError),

    /// Runtime failure inside a step handler
    #[error("Step {step} failed: {message}")]
    Step { step: String, message: String },

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Evaluation cancelled")]
    Cancelled,
}

/// Terminal status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
    Skipped,
    Timeout,
}

/// What one step did, as recorded in the receipt
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    #[serde(rename = "stepId")]
    pub step_id: String,
    pub status: StepStatus,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
