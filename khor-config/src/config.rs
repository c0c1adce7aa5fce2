//! Orchestrator configuration
//!
//! Loading hierarchy: env > file > defaults. Unrecognized keys warn rather
//! than fail so configs stay forward-compatible across releases.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

fn default_notes_ref() -> String {
    "refs/notes/khor/results".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_max() -> usize {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_grace_period_ms() -> u64 {
    500
}

/// Top-level configuration for the hook orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root of the project tree; all file operations are sandboxed below it
    pub project_root: PathBuf,
    /// Directories scanned for hook Turtle files
    #[serde(default)]
    pub hook_dirs: Vec<PathBuf>,
    /// Directories whose Turtle/N-Quads files seed the data graph
    #[serde(default)]
    pub graph_dirs: Vec<PathBuf>,
    /// Notes ref receiving receipts
    #[serde(default = "default_notes_ref")]
    pub notes_ref: String,
    /// Commands the CLI step may run
    #[serde(default)]
    pub shell_allow_list: Vec<String>,
    /// URL prefixes the HTTP step may reach; `None` allows all
    #[serde(default)]
    pub http_allow_list: Option<Vec<String>>,
    /// Worker pool size
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Pending-evaluation queue bound
    #[serde(default = "default_queue_max")]
    pub queue_max: usize,
    /// Wall-clock budget per evaluation
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Grace period before hard-killing handlers that ignore cancellation
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Ed25519 key file; receipts are signed only when present
    #[serde(default)]
    pub signing_key: Option<PathBuf>,
    /// Anything we did not recognize; reported via `warn!` on load
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            hook_dirs: vec![PathBuf::from("hooks")],
            graph_dirs: vec![PathBuf::from("graph")],
            notes_ref: default_notes_ref(),
            shell_allow_list: Vec::new(),
            http_allow_list: None,
            worker_count: default_worker_count(),
            queue_max: default_queue_max(),
            default_timeout_ms: default_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            signing_key: None,
            unknown: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse from TOML text, warning on unrecognized keys
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for key in config.unknown.keys() {
            warn!(key = %key, "unrecognized configuration key");
        }
        Ok(config)
    }

    /// Load from a TOML file, then apply `KHOR_*` environment overrides
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from an iterator of `(key, value)` pairs
    pub fn apply_env_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> ConfigResult<()> {
        for (key, value) in vars {
            match key.as_str() {
                "KHOR_PROJECT_ROOT" => self.project_root = PathBuf::from(value),
                "KHOR_NOTES_REF" => self.notes_ref = value,
                "KHOR_WORKER_COUNT" => {
                    self.worker_count = value.parse().map_err(|_| {
                        ConfigError::Validation(format!("Invalid KHOR_WORKER_COUNT: {}", value))
                    })?;
                }
                "KHOR_QUEUE_MAX" => {
                    self.queue_max = value.parse().map_err(|_| {
                        ConfigError::Validation(format!("Invalid KHOR_QUEUE_MAX: {}", value))
                    })?;
                }
                "KHOR_DEFAULT_TIMEOUT_MS" => {
                    self.default_timeout_ms = value.parse().map_err(|_| {
                        ConfigError::Validation(format!(
                            "Invalid KHOR_DEFAULT_TIMEOUT_MS: {}",
                            value
                        ))
                    })?;
                }
                "KHOR_SIGNING_KEY" => self.signing_key = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate invariants that would otherwise fail far from their cause
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::Validation(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_max == 0 {
            return Err(ConfigError::Validation(
                "queue_max must be at least 1".to_string(),
            ));
        }
        if !self.notes_ref.starts_with("refs/notes/") {
            return Err(ConfigError::Validation(format!(
                "notes_ref must live under refs/notes/, got {}",
                self.notes_ref
            )));
        }
        Ok(())
    }
}
