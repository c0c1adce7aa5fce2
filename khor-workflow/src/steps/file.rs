//! File step
//!
//! Read returns the file content into the context; the mutating operations
//! reuse the template engine's plan/apply so sandboxing, parent creation
//! and write-then-rename hold everywhere files change.

use super::{interpolate_str, StepContext, StepHandler, StepOutput};
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::StepDef;
use async_trait::async_trait;
use khor_template::{resolve_sandboxed, ApplyOptions, FileOp, FilePlan, ForceMode};
use serde_json::json;
use std::path::Path;

pub struct FileStep;

#[async_trait]
impl StepHandler for FileStep {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
        let operation = step.require_str("operation")?;
        match operation {
            "read" => read(step, ctx).await,
            "write" | "append" => write(step, ctx, operation == "append").await,
            "copy" => copy(step, ctx).await,
            "delete" => delete(step, ctx).await,
            other => Err(WorkflowError::Definition(format!(
                "unknown file operation: {}",
                other
            ))),
        }
    }
}

fn resolved_path(step: &StepDef, ctx: &StepContext<'_>, key: &str) -> WorkflowResult<std::path::PathBuf> {
    let raw = interpolate_str(ctx.engine, step.require_str(key)?, &ctx.vars)?;
    Ok(resolve_sandboxed(&ctx.config.project_root, Path::new(&raw))?)
}

async fn read(step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
    let path = resolved_path(step, ctx, "filePath")?;
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(StepOutput::ok(json!({
            "path": path.display().to_string(),
            "content": content,
        }))),
        Err(e) => Ok(StepOutput::failed(
            json!({ "path": path.display().to_string() }),
            format!("read failed: {}", e),
        )),
    }
}

async fn write(step: &StepDef, ctx: &StepContext<'_>, append: bool) -> WorkflowResult<StepOutput> {
    let path = resolved_path(step, ctx, "filePath")?;
    let content = interpolate_str(
        ctx.engine,
        step.config_str("content").unwrap_or_default(),
        &ctx.vars,
    )?;
    let plan = single_op_plan(FileOp::Write {
        path: path.clone(),
        content,
        mode: if append {
            ForceMode::Append
        } else {
            ForceMode::Overwrite
        },
    });
    apply_plan(ctx, plan, &path)
}

async fn copy(step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
    let from = resolved_path(step, ctx, "from")?;
    let to = resolved_path(step, ctx, "to")?;
    let plan = single_op_plan(FileOp::Copy {
        from,
        to: to.clone(),
    });
    apply_plan(ctx, plan, &to)
}

async fn delete(step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
    let path = resolved_path(step, ctx, "filePath")?;
    let plan = single_op_plan(FileOp::Delete { path: path.clone() });
    apply_plan(ctx, plan, &path)
}

fn single_op_plan(op: FileOp) -> FilePlan {
    FilePlan {
        ops: vec![op],
        ..FilePlan::default()
    }
}

fn apply_plan(
    ctx: &StepContext<'_>,
    plan: FilePlan,
    path: &Path,
) -> WorkflowResult<StepOutput> {
    let applied = khor_template::apply::apply(
        &ctx.config.project_root,
        &plan,
        &ApplyOptions::default(),
    )?;
    let value = json!({
        "path": path.display().to_string(),
        "changed": applied.changed,
    });
    match applied.first_failure() {
        Some(failure) => Ok(StepOutput::failed(
            value,
            failure
                .detail
                .clone()
                .unwrap_or_else(|| "file operation failed".to_string()),
        )),
        None => Ok(StepOutput::ok(value)),
    }
}
