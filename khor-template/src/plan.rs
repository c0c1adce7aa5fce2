//! File plans
//!
//! A plan is the pure output of planning a template: an ordered list of
//! file operations plus the rendered body. Plans are structurally
//! comparable so determinism can be asserted, and serializable so receipts
//! can embed them.

use crate::frontmatter::{ForceMode, InjectWhere};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One filesystem operation; paths are absolute and already sandboxed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FileOp {
    Write {
        path: PathBuf,
        content: String,
        mode: ForceMode,
    },
    Inject {
        path: PathBuf,
        snippet: String,
        anchor: String,
        location: InjectWhere,
        once: bool,
    },
    Copy {
        from: PathBuf,
        to: PathBuf,
    },
    Delete {
        path: PathBuf,
    },
}

impl FileOp {
    /// The path this operation mutates (the destination for copies)
    pub fn target(&self) -> &PathBuf {
        match self {
            FileOp::Write { path, .. } => path,
            FileOp::Inject { path, .. } => path,
            FileOp::Copy { to, .. } => to,
            FileOp::Delete { path } => path,
        }
    }
}

/// Ordered file operations produced from one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilePlan {
    pub ops: Vec<FileOp>,
    /// Rendered template body (also the content of each Write)
    pub body: String,
    /// Allow-listed commands to run before/after applying
    #[serde(default)]
    pub shell_before: Vec<String>,
    #[serde(default)]
    pub shell_after: Vec<String>,
    /// Graph-context hints carried through from the front matter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

/// Planning outcome: a plan, or a skip with its reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Planned {
    Plan(FilePlan),
    Skipped { reason: String },
}

impl Planned {
    pub fn as_plan(&self) -> Option<&FilePlan> {
        match self {
            Planned::Plan(plan) => Some(plan),
            Planned::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Planned::Skipped { .. })
    }
}
