//! Hook orchestrator
//!
//! Owns the data graph, the hooks graph and the hook set. Evaluations
//! capture the graph snapshot at scheduling time, run under the configured
//! wall-clock budget, and always produce exactly one receipt, timeout
//! included. Cancellation happens at suspension points when the budget
//! expires: the evaluation future is dropped, child processes die with it,
//! and no lock is held during evaluation (the notes lock is only taken for
//! the receipt write afterwards).

use crate::baseline::BaselineStore;
use crate::error::{HookError, HookResult};
use crate::events::GitEvent;
use crate::loader::{self, HookLoadReport};
use crate::model::Hook;
use crate::predicate::{self, PredicateVerdict};
use crate::receipt::{load_signing_key, PredicateReceipt, Receipt, ReceiptStatus};
use crate::scheduler::TimerSpec;
use ed25519_dalek::SigningKey;
use khor_config::{ExecutionContext, OrchestratorConfig};
use khor_git::GitBackend;
use khor_graph::{GraphSnapshot, GraphStore};
use khor_workflow::{load_pipeline, PipelineRunner, StepResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Deadline for taking the notes lock before the write counts as contended
const NOTES_LOCK_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct EvalJob {
    hook_iri: String,
    cause: String,
}

/// Running background tasks; abort on shutdown
pub struct OrchestratorHandle {
    workers: Vec<JoinHandle<()>>,
    timers: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    pub async fn shutdown(self) {
        for timer in &self.timers {
            timer.abort();
        }
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// Point-in-time counters for the collaborator-facing stats call
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorStats {
    pub hooks: usize,
    pub evaluations: u64,
    pub fired: u64,
    pub timeouts: u64,
    pub receipts_written: u64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

#[derive(Default)]
struct Counters {
    evaluations: AtomicU64,
    fired: AtomicU64,
    timeouts: AtomicU64,
    receipts_written: AtomicU64,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    exec: ExecutionContext,
    graph: GraphStore,
    hooks_graph: GraphStore,
    hooks: RwLock<HashMap<String, Hook>>,
    baselines: BaselineStore,
    git: GitBackend,
    runner: PipelineRunner,
    signing: Option<SigningKey>,
    counters: Counters,
    queue_tx: mpsc::Sender<EvalJob>,
    queue_rx: AsyncMutex<Option<mpsc::Receiver<EvalJob>>>,
}

impl Orchestrator {
    /// Build an orchestrator; a missing project root aborts startup
    pub fn new(config: OrchestratorConfig, exec: ExecutionContext) -> HookResult<Self> {
        config.validate()?;
        if !config.project_root.is_dir() {
            return Err(HookError::Io(format!(
                "project root missing: {}",
                config.project_root.display()
            )));
        }
        let signing = match &config.signing_key {
            Some(path) => Some(load_signing_key(path)?),
            None => None,
        };
        let baselines = BaselineStore::open(config.project_root.join(".khor/baselines.json"))?;
        let git = GitBackend::new(config.project_root.clone(), exec.clone());
        let runner = PipelineRunner::new(config.clone(), exec.clone());
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_max);
        Ok(Self {
            config,
            exec,
            graph: GraphStore::new()?,
            hooks_graph: GraphStore::new()?,
            hooks: RwLock::new(HashMap::new()),
            baselines,
            git,
            runner,
            signing,
            counters: Counters::default(),
            queue_tx,
            queue_rx: AsyncMutex::new(Some(queue_rx)),
        })
    }

    /// The data graph; callers ingest Turtle/N-Quads/CSV through it
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Counters since startup plus the current queue occupancy
    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            hooks: self.hooks.read().len(),
            evaluations: self.counters.evaluations.load(Ordering::Relaxed),
            fired: self.counters.fired.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            receipts_written: self.counters.receipts_written.load(Ordering::Relaxed),
            queue_depth: self.config.queue_max - self.queue_tx.capacity(),
            queue_capacity: self.config.queue_max,
        }
    }

    /// Ingest every RDF file under the configured graph directories
    pub fn load_graph_dirs(&self) -> HookResult<usize> {
        let mut quads = 0;
        for dir in &self.config.graph_dirs {
            let dir = self.config.project_root.join(dir);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                debug!(dir = %dir.display(), "graph directory not readable, skipping");
                continue;
            };
            let mut files: Vec<_> = entries.flatten().map(|e| e.path()).collect();
            files.sort();
            for path in files {
                let text = std::fs::read_to_string(&path)?;
                match path.extension().and_then(|e| e.to_str()) {
                    Some("ttl") => {
                        quads += self.graph.ingest_turtle_file(
                            &text,
                            None,
                            &path.display().to_string(),
                        )?;
                    }
                    Some("nq") => quads += self.graph.ingest_nquads(&text)?,
                    _ => {}
                }
            }
        }
        info!(quads, "data graph loaded");
        Ok(quads)
    }

    /// Re-scan hook directories, replacing the hook set
    pub fn rescan_hooks(&self) -> HookResult<HookLoadReport> {
        self.hooks_graph.clear()?;
        let dirs: Vec<_> = self
            .config
            .hook_dirs
            .iter()
            .map(|d| self.config.project_root.join(d))
            .collect();
        let report = loader::scan_dirs(&self.hooks_graph, &dirs)?;
        let mut hooks = self.hooks.write();
        hooks.clear();
        for hook in &report.hooks {
            hooks.insert(hook.iri.clone(), hook.clone());
        }
        Ok(report)
    }

    /// All loaded hooks (disabled ones included), sorted by IRI
    pub fn hooks(&self) -> Vec<Hook> {
        let mut hooks: Vec<Hook> = self.hooks.read().values().cloned().collect();
        hooks.sort_by(|a, b| a.iri.cmp(&b.iri));
        hooks
    }

    /// Evaluate every enabled hook listening to this event, in IRI order
    pub async fn handle_event(&self, event: &GitEvent) -> Vec<Receipt> {
        let matching: Vec<Hook> = self
            .hooks()
            .into_iter()
            .filter(|h| !h.disabled && h.listens_to(event.kind))
            .collect();
        let mut receipts = Vec::with_capacity(matching.len());
        for hook in matching {
            match self.evaluate_hook(&hook.iri).await {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => error!(hook = %hook.iri, error = %e, "evaluation failed"),
            }
        }
        receipts
    }

    /// Queue every hook listening to this event; `QueueFull` is a soft
    /// failure the caller may surface
    pub fn enqueue_event(&self, event: &GitEvent) -> HookResult<usize> {
        let mut queued = 0;
        for hook in self.hooks() {
            if hook.disabled || !hook.listens_to(event.kind) {
                continue;
            }
            self.enqueue(&hook.iri, event.kind.as_str())?;
            queued += 1;
        }
        Ok(queued)
    }

    fn enqueue(&self, hook_iri: &str, cause: &str) -> HookResult<()> {
        self.queue_tx
            .try_send(EvalJob {
                hook_iri: hook_iri.to_string(),
                cause: cause.to_string(),
            })
            .map_err(|_| HookError::QueueFull)
    }

    /// Evaluate one hook now: snapshot, predicate, pipelines, receipt
    pub async fn evaluate_hook(&self, hook_iri: &str) -> HookResult<Receipt> {
        let hook = self
            .hooks
            .read()
            .get(hook_iri)
            .cloned()
            .ok_or_else(|| HookError::UnknownHook(hook_iri.to_string()))?;
        if hook.disabled {
            return Err(HookError::Definition(format!("hook {} is disabled", hook_iri)));
        }

        // Snapshot at scheduling time; the whole evaluation reads this view
        let snapshot = self.graph.snapshot();
        let hooks_snapshot = self.hooks_graph.snapshot();
        let fired_at = self
            .exec
            .now()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.default_timeout_ms);

        self.counters.evaluations.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(
            budget,
            self.evaluate_inner(&hook, &snapshot, &hooks_snapshot),
        )
        .await;
        let eval_duration_ms = started.elapsed().as_millis() as u64;

        let (status, predicate_receipt, pipeline, new_baseline) = match outcome {
            Ok(Ok(eval)) => {
                if eval.verdict.fired {
                    self.counters.fired.fetch_add(1, Ordering::Relaxed);
                }
                let status = if eval.pipelines_ok {
                    ReceiptStatus::Ok
                } else {
                    ReceiptStatus::Error
                };
                (
                    status,
                    PredicateReceipt::from(&eval.verdict),
                    eval.steps,
                    eval.verdict.new_baseline,
                )
            }
            Ok(Err(e)) => {
                warn!(hook = %hook.iri, error = %e, "evaluation errored");
                (
                    ReceiptStatus::Error,
                    PredicateReceipt {
                        kind: hook.predicate.kind().to_string(),
                        verdict: false,
                        metrics: serde_json::json!({ "error": e.to_string() }),
                    },
                    Vec::new(),
                    None,
                )
            }
            Err(_elapsed) => {
                // In-flight handlers stop at their next suspension point
                // when the future drops; partial plans die with it
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(hook = %hook.iri, budget_ms = budget.as_millis() as u64, "evaluation timed out");
                (
                    ReceiptStatus::Timeout,
                    PredicateReceipt {
                        kind: hook.predicate.kind().to_string(),
                        verdict: false,
                        metrics: serde_json::json!({ "timedOut": true }),
                    },
                    Vec::new(),
                    None,
                )
            }
        };

        let commit = self
            .git
            .head()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        let worktree = self
            .git
            .worktree_key()
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        let mut receipt = Receipt {
            hook_id: hook.iri.clone(),
            fired_at,
            eval_duration_ms,
            status,
            predicate: predicate_receipt,
            pipeline,
            worktree,
            commit,
            content_hash: String::new(),
            signature: None,
        };
        receipt.seal(self.signing.as_ref())?;

        // A failed receipt write is a soft failure: the baseline stays
        // unpersisted so a delta predicate fires again next tick
        match self.write_receipt(&receipt).await {
            Ok(()) => {
                self.counters.receipts_written.fetch_add(1, Ordering::Relaxed);
                if let Some((id, hash)) = new_baseline {
                    self.baselines.set(&id, &hash)?;
                }
            }
            Err(e) => warn!(hook = %hook.iri, error = %e, "receipt write failed"),
        }

        debug!(hook = %hook.iri, status = ?receipt.status, fired = receipt.predicate.verdict, "evaluation complete");
        Ok(receipt)
    }

    async fn evaluate_inner(
        &self,
        hook: &Hook,
        snapshot: &Arc<GraphSnapshot>,
        hooks_snapshot: &Arc<GraphSnapshot>,
    ) -> HookResult<Evaluation> {
        let verdict = predicate::evaluate(&hook.predicate, snapshot, &self.baselines)?;
        let mut steps: Vec<StepResult> = Vec::new();
        let mut pipelines_ok = true;

        if verdict.fired {
            let mut inputs = Map::new();
            inputs.insert("hookId".to_string(), Value::String(hook.iri.clone()));
            if let Some(title) = &hook.title {
                inputs.insert("hookTitle".to_string(), Value::String(title.clone()));
            }
            for pipeline_iri in &hook.pipelines {
                let pipeline = load_pipeline(hooks_snapshot, pipeline_iri)?;
                let run = self.runner.run(snapshot, &pipeline, inputs.clone()).await;
                pipelines_ok &= run.success;
                steps.extend(run.results);
            }
        }

        Ok(Evaluation {
            verdict,
            steps,
            pipelines_ok,
        })
    }

    /// Append the receipt to the notes ref, serialized by the notes lock
    async fn write_receipt(&self, receipt: &Receipt) -> HookResult<()> {
        if receipt.commit == "unknown" {
            return Err(HookError::Io(
                "no commit to annotate; is this a git repository?".to_string(),
            ));
        }
        let payload = receipt.to_json()?;
        let lease = self
            .git
            .ref_lock_with_retry("notes", NOTES_LOCK_DEADLINE)
            .await?;
        let append = self
            .git
            .notes_append(&self.config.notes_ref, &receipt.commit, &payload)
            .await;
        let release = lease.release(&self.git).await;
        append?;
        release?;
        Ok(())
    }

    /// Start the worker pool and timer tasks
    pub async fn start(self: &Arc<Self>) -> HookResult<OrchestratorHandle> {
        let mut rx_slot = self.queue_rx.lock().await;
        let rx = rx_slot
            .take()
            .ok_or_else(|| HookError::Definition("orchestrator already started".to_string()))?;
        drop(rx_slot);
        let rx = Arc::new(AsyncMutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let this = Arc::clone(self);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    debug!(worker_id, hook = %job.hook_iri, cause = %job.cause, "worker picked job");
                    if let Err(e) = this.evaluate_hook(&job.hook_iri).await {
                        error!(hook = %job.hook_iri, error = %e, "queued evaluation failed");
                    }
                }
            }));
        }

        // One interval task per distinct timer spec across the hook set
        let mut specs: HashSet<TimerSpec> = HashSet::new();
        for hook in self.hooks() {
            if let Some(spec) = hook.timer() {
                specs.insert(spec);
            }
        }
        let mut timers = Vec::with_capacity(specs.len());
        for spec in specs {
            let this = Arc::clone(self);
            timers.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(spec.period());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    for hook in this.hooks() {
                        if hook.disabled || hook.timer() != Some(spec) {
                            continue;
                        }
                        if let Err(e) = this.enqueue(&hook.iri, &spec.name()) {
                            warn!(hook = %hook.iri, error = %e, "timer enqueue rejected");
                        }
                    }
                }
            }));
        }

        info!(
            workers = workers.len(),
            timers = timers.len(),
            "orchestrator started"
        );
        Ok(OrchestratorHandle { workers, timers })
    }
}

struct Evaluation {
    verdict: PredicateVerdict,
    steps: Vec<StepResult>,
    pipelines_ok: bool,
}
