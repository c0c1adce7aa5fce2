//! Typed step handlers
//!
//! Dispatch is a tagged match over the five kinds; every handler implements
//! the same trait and returns its output into the context. Handlers report
//! runtime failures through `StepOutput::error` so the runner can honor the
//! step's `onError` policy; hard definition problems return `Err`.

pub mod cli;
pub mod file;
pub mod http;
pub mod sparql;
pub mod template;

use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{StepDef, StepKind};
use async_trait::async_trait;
use khor_config::{ExecutionContext, OrchestratorConfig};
use khor_graph::GraphSnapshot;
use khor_template::TemplateEngine;
use serde_json::Value;

/// Everything a handler may touch during one step
pub struct StepContext<'a> {
    pub snapshot: &'a GraphSnapshot,
    pub engine: &'a TemplateEngine,
    pub config: &'a OrchestratorConfig,
    pub exec: &'a ExecutionContext,
    pub http: &'a reqwest::Client,
    /// The view of the workflow context visible to this step
    pub vars: Value,
}

/// What a step hands back into the context
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Raw output stored under `steps[stepId]`
    pub value: Value,
    /// Named values merged into the shared data space
    pub published: Vec<(String, Value)>,
    /// Runtime failure, if any; honors the step's onError policy
    pub error: Option<String>,
    /// The failure was a timeout
    pub timed_out: bool,
    /// The step decided not to run (a template whose `when` was false)
    pub skipped: bool,
}

impl StepOutput {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn failed(value: Value, error: impl Into<String>) -> Self {
        Self {
            value,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput>;
}

/// Tagged dispatch over the five step kinds
pub fn handler_for(kind: StepKind) -> &'static dyn StepHandler {
    match kind {
        StepKind::Sparql => &sparql::SparqlStep,
        StepKind::Template => &template::TemplateStep,
        StepKind::File => &file::FileStep,
        StepKind::Http => &http::HttpStep,
        StepKind::Cli => &cli::CliStep,
    }
}

/// Substitute `{{ name }}` against the step's visible context
pub(crate) fn interpolate_str(
    engine: &TemplateEngine,
    raw: &str,
    vars: &Value,
) -> WorkflowResult<String> {
    if raw.contains("{{") || raw.contains("{%") {
        Ok(engine.render_str(raw, vars)?)
    } else {
        Ok(raw.to_string())
    }
}

/// Interpolate every string inside a config value, recursively
pub(crate) fn interpolate_value(
    engine: &TemplateEngine,
    value: &Value,
    vars: &Value,
) -> WorkflowResult<Value> {
    Ok(match value {
        Value::String(s) => Value::String(interpolate_str(engine, s, vars)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| interpolate_value(engine, v, vars))
                .collect::<WorkflowResult<_>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate_value(engine, v, vars)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Split an allow-listed command line into command and arguments
pub(crate) fn split_command_line(line: &str) -> WorkflowResult<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(ToString::to_string);
    let command = parts
        .next()
        .ok_or_else(|| WorkflowError::Definition("empty command line".into()))?;
    Ok((command, parts.collect()))
}

/// Check a command against the shell allow-list by basename
pub(crate) fn ensure_allowed(config: &OrchestratorConfig, command: &str) -> WorkflowResult<()> {
    let basename = std::path::Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| command.to_string());
    if config
        .shell_allow_list
        .iter()
        .any(|allowed| allowed == &basename)
    {
        Ok(())
    } else {
        Err(WorkflowError::CommandNotAllowed(command.to_string()))
    }
}
