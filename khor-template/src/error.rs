//! Error types for templates and file plans

use std::path::PathBuf;
use thiserror::Error;

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Render failed: {0}")]
    Render(String),

    #[error("Front matter invalid: {0}")]
    FrontMatter(String),

    /// A resolved path left the project root
    #[error("Path escapes project root: {path}")]
    PathEscape { path: String },

    /// `force = "error"` and the target already exists
    #[error("Target already exists: {path}")]
    Exists { path: PathBuf },

    /// Injection anchor was not found in the target file
    #[error("Anchor not found in {path}: {find:?}")]
    AnchorNotFound { path: PathBuf, find: String },

    #[error("File operation failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for TemplateError {
    fn from(err: std::io::Error) -> Self {
        TemplateError::Io(err.to_string())
    }
}
