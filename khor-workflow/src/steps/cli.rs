//! CLI step
//!
//! Commands run against the configured allow-list only, under the
//! execution context's cwd/env, with a timeout. Children are spawned with
//! kill-on-drop so a cancelled evaluation takes its subprocess down with
//! it after the grace period.

use super::{ensure_allowed, interpolate_str, split_command_line, StepContext, StepHandler, StepOutput};
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::StepDef;
use async_trait::async_trait;
use khor_template::resolve_sandboxed;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

pub struct CliStep;

#[async_trait]
impl StepHandler for CliStep {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
        let command = interpolate_str(ctx.engine, step.require_str("command")?, &ctx.vars)?;
        let args: Vec<String> = match step.config.get("args") {
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let raw = item.as_str().map(ToString::to_string).unwrap_or_else(|| item.to_string());
                    out.push(interpolate_str(ctx.engine, &raw, &ctx.vars)?);
                }
                out
            }
            Some(Value::String(line)) => {
                let rendered = interpolate_str(ctx.engine, line, &ctx.vars)?;
                rendered.split_whitespace().map(ToString::to_string).collect()
            }
            _ => Vec::new(),
        };
        let cwd = step.config_str("cwd");
        let env = step.config.get("env").and_then(Value::as_object).cloned();
        let timeout_ms = step.config.get("timeout").and_then(Value::as_u64);

        run_command(ctx, &command, &args, cwd, env.as_ref(), timeout_ms).await
    }
}

/// Run a whole command line (used by template `sh` hooks)
pub(crate) async fn run_command_line(
    ctx: &StepContext<'_>,
    line: &str,
    timeout_ms: Option<u64>,
) -> WorkflowResult<StepOutput> {
    let (command, args) = split_command_line(line)?;
    let output = run_command(ctx, &command, &args, None, None, timeout_ms).await?;
    if let Some(error) = &output.error {
        return Err(WorkflowError::Step {
            step: line.to_string(),
            message: error.clone(),
        });
    }
    Ok(output)
}

async fn run_command(
    ctx: &StepContext<'_>,
    command: &str,
    args: &[String],
    cwd: Option<&str>,
    env: Option<&serde_json::Map<String, Value>>,
    timeout_ms: Option<u64>,
) -> WorkflowResult<StepOutput> {
    ensure_allowed(ctx.config, command)?;

    let working_dir = match cwd {
        Some(dir) => resolve_sandboxed(&ctx.config.project_root, Path::new(dir))?,
        None => ctx.exec.cwd.clone(),
    };

    let mut child = Command::new(command);
    child
        .args(args)
        .current_dir(&working_dir)
        .envs(ctx.exec.env.iter())
        .kill_on_drop(true);
    if let Some(env) = env {
        for (key, value) in env {
            if let Some(value) = value.as_str() {
                child.env(key, value);
            }
        }
    }

    let timeout = Duration::from_millis(timeout_ms.unwrap_or(ctx.config.default_timeout_ms));
    let output = match tokio::time::timeout(timeout, child.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Ok(StepOutput::failed(
                json!({ "command": command }),
                format!("failed to spawn {}: {}", command, e),
            ));
        }
        Err(_elapsed) => {
            // kill_on_drop reaps the child once the future is gone
            let mut failed = StepOutput::failed(
                json!({ "command": command, "timedOut": true }),
                format!("command timed out after {}ms", timeout.as_millis()),
            );
            failed.timed_out = true;
            return Ok(failed);
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let value = json!({
        "command": command,
        "args": args,
        "exitCode": exit_code,
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
    });
    if output.status.success() {
        Ok(StepOutput::ok(value))
    } else {
        Ok(StepOutput::failed(
            value,
            format!("command exited with code {}", exit_code),
        ))
    }
}
