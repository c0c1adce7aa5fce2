//! Knowledge-hook orchestrator.
//!
//! Hooks are Turtle-defined bindings of a predicate over the knowledge
//! graph to ordered workflow pipelines. The orchestrator discovers hooks,
//! schedules evaluations on git events and timers through a bounded queue
//! and worker pool, enforces wall-clock budgets, and appends one signed
//! JSON receipt per evaluation to a git notes ref.

pub mod baseline;
pub mod error;
pub mod events;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod predicate;
pub mod receipt;
pub mod scheduler;

pub use baseline::BaselineStore;
pub use error::{HookError, HookResult};
pub use events::{GitEvent, GitEventKind};
pub use loader::HookLoadReport;
pub use model::{Hook, Trigger};
pub use orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorStats};
pub use predicate::{PredicateDef, PredicateVerdict, Reducer, ThresholdOp};
pub use receipt::Receipt;
pub use scheduler::TimerSpec;
