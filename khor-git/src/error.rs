//! Error types for the git backend

use thiserror::Error;

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

#[derive(Debug, Error)]
pub enum GitError {
    /// git exited non-zero
    #[error("git {} failed: {stderr}", args.join(" "))]
    Exec { args: Vec<String>, stderr: String },

    /// Another holder owns the lock ref
    #[error("Lock contended on {ref_name}")]
    LockContended { ref_name: String },

    #[error("Failed to launch git: {0}")]
    Spawn(String),

    #[error("Unparseable git output: {0}")]
    Parse(String),
}
