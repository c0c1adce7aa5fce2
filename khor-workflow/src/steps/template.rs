//! Template step
//!
//! Renders a template (inline text or a file under the project root) with
//! the step's visible context. With `outputPath` the result goes through
//! plan/apply; otherwise the rendered string lands in the context. A
//! template's own front matter still applies, and its `sh` hooks run
//! through the shell allow-list.

use super::{cli, interpolate_str, StepContext, StepHandler, StepOutput};
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::StepDef;
use async_trait::async_trait;
use khor_template::{resolve_sandboxed, ApplyOptions, FileOp, ForceMode, Planned};
use serde_json::json;
use std::path::Path;

pub struct TemplateStep;

#[async_trait]
impl StepHandler for TemplateStep {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
        let template_text = match (step.config_str("template"), step.config_str("templatePath")) {
            (Some(inline), _) => inline.to_string(),
            (None, Some(path)) => {
                let resolved =
                    resolve_sandboxed(&ctx.config.project_root, Path::new(path))?;
                std::fs::read_to_string(&resolved).map_err(|e| WorkflowError::Step {
                    step: step.id.clone(),
                    message: format!("cannot read template {}: {}", resolved.display(), e),
                })?
            }
            (None, None) => {
                return Err(WorkflowError::MissingConfig {
                    step: step.id.clone(),
                    field: "template".to_string(),
                })
            }
        };

        let planned = ctx.engine.plan(&template_text, &ctx.vars)?;
        let mut plan = match planned {
            Planned::Skipped { reason } => {
                let mut output = StepOutput::ok(json!({ "skipped": true, "reason": reason }));
                output.skipped = true;
                return Ok(output);
            }
            Planned::Plan(plan) => plan,
        };

        // An explicit outputPath writes the rendered body even when the
        // template declared no `to` targets of its own
        if let Some(output_path) = step.config_str("outputPath") {
            let rendered_path = interpolate_str(ctx.engine, output_path, &ctx.vars)?;
            let path = resolve_sandboxed(&ctx.config.project_root, Path::new(&rendered_path))?;
            plan.ops.push(FileOp::Write {
                path,
                content: plan.body.clone(),
                mode: ForceMode::Overwrite,
            });
        }

        if plan.ops.is_empty() {
            return Ok(StepOutput::ok(json!({ "rendered": plan.body })));
        }

        run_shell_hooks(ctx, &plan.shell_before).await?;
        let applied = ctx.engine.apply(&plan, &ApplyOptions::default())?;
        run_shell_hooks(ctx, &plan.shell_after).await?;

        let value = json!({
            "rendered": plan.body,
            "applied": applied.ops.len(),
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
}

async fn run_shell_hooks(ctx: &StepContext<'_>, hooks: &[String]) -> WorkflowResult<()> {
    for line in hooks {
        cli::run_command_line(ctx, line, None).await?;
    }
    Ok(())
}
