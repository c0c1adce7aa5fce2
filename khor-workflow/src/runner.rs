//! Sequential pipeline execution
//!
//! Steps run in topological order; each sees only its transitive
//! dependencies' outputs. Failures honor the step's `onError` policy: abort
//! marks the remaining steps skipped, continue records the failure and
//! moves on, retry re-runs with exponential backoff.

use crate::context::WorkflowContext;
use crate::error::{StepResult, StepStatus, WorkflowResult};
use crate::model::{OnError, Pipeline, StepDef};
use crate::steps::{handler_for, StepContext, StepOutput};
use khor_config::{ExecutionContext, OrchestratorConfig};
use khor_graph::GraphSnapshot;
use khor_template::TemplateEngine;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineRun {
    pub pipeline_id: String,
    pub results: Vec<StepResult>,
    pub context: WorkflowContext,
    /// False when an aborting failure stopped the pipeline
    pub success: bool,
}

pub struct PipelineRunner {
    config: OrchestratorConfig,
    exec: ExecutionContext,
    engine: TemplateEngine,
    http: reqwest::Client,
}

impl PipelineRunner {
    pub fn new(config: OrchestratorConfig, exec: ExecutionContext) -> Self {
        let engine = TemplateEngine::with_clock(config.project_root.clone(), exec.clock.clone());
        Self {
            config,
            exec,
            engine,
            http: reqwest::Client::new(),
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Run every step of the pipeline against one graph snapshot
    pub async fn run(
        &self,
        snapshot: &GraphSnapshot,
        pipeline: &Pipeline,
        inputs: Map<String, Value>,
    ) -> PipelineRun {
        let mut context = WorkflowContext::new(inputs);
        let mut results = Vec::with_capacity(pipeline.steps.len());
        let mut aborted = false;

        for (index, step) in pipeline.steps.iter().enumerate() {
            if aborted {
                results.push(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                    error: None,
                });
                continue;
            }

            let visible = pipeline.transitive_deps(&step.id);
            let vars = context.view_for(&visible);
            let started = Instant::now();
            let outcome = self.run_with_policy(snapshot, step, vars).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    let status = match (&output.error, output.timed_out, output.skipped) {
                        (None, _, true) => StepStatus::Skipped,
                        (None, _, false) => StepStatus::Ok,
                        (Some(_), true, _) => StepStatus::Timeout,
                        (Some(_), false, _) => StepStatus::Error,
                    };
                    let error = output.error.clone();
                    context.record_step(&step.id, output.value.clone());
                    for (key, value) in output.published {
                        context.publish(&step.id, &key, value);
                    }
                    if matches!(status, StepStatus::Error | StepStatus::Timeout)
                        && step.on_error == OnError::Abort
                    {
                        aborted = true;
                    }
                    if let Some(error) = &error {
                        warn!(step = %step.id, %error, "step failed");
                    }
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        status,
                        duration_ms,
                        error,
                    });
                }
                Err(err) => {
                    // Hard errors (bad config, sandbox violations) abort
                    // unless the step opted into continue
                    warn!(step = %step.id, error = %err, "step raised");
                    if step.on_error == OnError::Abort {
                        aborted = true;
                    }
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Error,
                        duration_ms,
                        error: Some(err.to_string()),
                    });
                }
            }
            debug!(
                step = %step.id,
                index,
                status = ?results.last().map(|r| r.status),
                "step finished"
            );
        }

        PipelineRun {
            pipeline_id: pipeline.id.clone(),
            results,
            context,
            success: !aborted,
        }
    }

    /// Execute one step, retrying per its policy
    async fn run_with_policy(
        &self,
        snapshot: &GraphSnapshot,
        step: &StepDef,
        vars: Value,
    ) -> WorkflowResult<StepOutput> {
        let (retries, backoff_ms) = match step.on_error {
            OnError::Retry {
                attempts,
                backoff_ms,
            } => (attempts, backoff_ms),
            _ => (0, 0),
        };

        let mut attempt = 0;
        loop {
            let ctx = StepContext {
                snapshot,
                engine: &self.engine,
                config: &self.config,
                exec: &self.exec,
                http: &self.http,
                vars: vars.clone(),
            };
            let outcome = handler_for(step.kind).execute(step, &ctx).await;
            let failed = match &outcome {
                Ok(output) => output.error.is_some(),
                Err(_) => true,
            };
            if !failed || attempt >= retries {
                return outcome;
            }
            attempt += 1;
            let delay = backoff_ms.saturating_mul(1u64 << (attempt - 1).min(16));
            debug!(step = %step.id, attempt, delay_ms = delay, "retrying step");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}
