//! Execution context and configuration for the khor orchestrator.
//!
//! The context is a plain value handed into every handler that needs the
//! working directory, environment, or time source. Configuration loads from
//! a TOML file with environment overrides (env > file > defaults).

pub mod config;
pub mod context;
pub mod error;

pub use config::OrchestratorConfig;
pub use context::{Clock, ContextOverrides, ExecutionContext};
pub use error::{ConfigError, ConfigResult};
