//! Template engine with front-matter file plans.
//!
//! Rendering is a pure function of (template, variables, clock). The
//! front-matter header declares what the rendered output does to the tree;
//! [`TemplateEngine::plan`] turns it into a [`FilePlan`] without touching
//! the filesystem, and [`apply`](plan/apply) executes the plan with
//! idempotent injections and sandboxed, write-then-rename file operations.

pub mod apply;
pub mod engine;
pub mod error;
pub mod filters;
pub mod frontmatter;
pub mod paths;
pub mod plan;

pub use apply::{ApplyOptions, ApplyResult, OpResult, OpStatus};
pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use frontmatter::{split_front_matter, ForceMode, FrontMatter, InjectWhere};
pub use paths::resolve_sandboxed;
pub use plan::{FileOp, FilePlan, Planned};
