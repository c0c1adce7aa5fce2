//! Plan application
//!
//! Operations run in plan order. Whole-file writes go through a temp file
//! and rename in the target directory. A failing operation stops the rest
//! unless the caller asked to continue; every operation's outcome is
//! reported either way.

use crate::error::{TemplateError, TemplateResult};
use crate::frontmatter::{ForceMode, InjectWhere};
use crate::plan::{FileOp, FilePlan};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute outcomes without mutating the tree
    pub dry_run: bool,
    /// Keep executing operations after a failure
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OpStatus {
    Applied,
    Skipped,
    Failed,
}

/// Outcome of one operation
#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub op: FileOp,
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of a whole plan
#[derive(Debug, Clone, Serialize, Default)]
pub struct ApplyResult {
    pub ops: Vec<OpResult>,
    /// True when at least one operation mutated the tree
    pub changed: bool,
}

impl ApplyResult {
    pub fn first_failure(&self) -> Option<&OpResult> {
        self.ops.iter().find(|op| op.status == OpStatus::Failed)
    }

    pub fn succeeded(&self) -> bool {
        self.first_failure().is_none()
    }
}

/// Execute the plan's operations in listed order
pub fn apply(root: &Path, plan: &FilePlan, options: &ApplyOptions) -> TemplateResult<ApplyResult> {
    let mut result = ApplyResult::default();
    for op in &plan.ops {
        // Paths were sandboxed at plan time; re-check so a hand-built plan
        // cannot slip outside the root either.
        if let Err(err) = crate::paths::resolve_sandboxed(root, op.target()) {
            return Err(err);
        }
        let outcome = match execute(op, options.dry_run) {
            Ok((status, detail)) => OpResult {
                op: op.clone(),
                status,
                detail,
            },
            Err(err) => OpResult {
                op: op.clone(),
                status: OpStatus::Failed,
                detail: Some(err.to_string()),
            },
        };
        if outcome.status == OpStatus::Applied {
            result.changed = true;
        }
        let failed = outcome.status == OpStatus::Failed;
        result.ops.push(outcome);
        if failed && !options.continue_on_error {
            break;
        }
    }
    debug!(ops = result.ops.len(), changed = result.changed, "applied file plan");
    Ok(result)
}

fn execute(op: &FileOp, dry_run: bool) -> TemplateResult<(OpStatus, Option<String>)> {
    match op {
        FileOp::Write {
            path,
            content,
            mode,
        } => write_op(path, content, *mode, dry_run),
        FileOp::Inject {
            path,
            snippet,
            anchor,
            location,
            once,
        } => inject_op(path, snippet, anchor, *location, *once, dry_run),
        FileOp::Copy { from, to } => copy_op(from, to, dry_run),
        FileOp::Delete { path } => delete_op(path, dry_run),
    }
}

fn write_op(
    path: &Path,
    content: &str,
    mode: ForceMode,
    dry_run: bool,
) -> TemplateResult<(OpStatus, Option<String>)> {
    let exists = path.exists();
    match mode {
        ForceMode::Error if exists => Err(TemplateError::Exists {
            path: path.to_path_buf(),
        }),
        ForceMode::SkipIfExists if exists => {
            Ok((OpStatus::Skipped, Some("target exists".to_string())))
        }
        ForceMode::Append => {
            let existing = if exists {
                fs::read_to_string(path)?
            } else {
                String::new()
            };
            // Append exactly once per unique snippet
            if existing.contains(content) {
                return Ok((
                    OpStatus::Skipped,
                    Some(format!("snippet {} already present", snippet_hash(content))),
                ));
            }
            if !dry_run {
                let mut appended = existing;
                appended.push_str(content);
                write_atomic(path, &appended)?;
            }
            Ok((OpStatus::Applied, None))
        }
        _ => {
            if !dry_run {
                write_atomic(path, content)?;
            }
            Ok((OpStatus::Applied, None))
        }
    }
}

fn inject_op(
    path: &Path,
    snippet: &str,
    anchor: &str,
    location: InjectWhere,
    once: bool,
    dry_run: bool,
) -> TemplateResult<(OpStatus, Option<String>)> {
    let original = fs::read_to_string(path)
        .map_err(|e| TemplateError::Io(format!("{}: {}", path.display(), e)))?;
    let had_trailing_newline = original.ends_with('\n');
    let mut lines: Vec<String> = original.lines().map(ToString::to_string).collect();

    // Literal match on a line-boundary basis
    let anchor_index = lines
        .iter()
        .position(|line| line.contains(anchor))
        .ok_or_else(|| TemplateError::AnchorNotFound {
            path: path.to_path_buf(),
            find: anchor.to_string(),
        })?;

    if once {
        let already = match location {
            InjectWhere::Before => anchor_index > 0 && lines[anchor_index - 1] == snippet,
            InjectWhere::After => lines.get(anchor_index + 1).map(String::as_str) == Some(snippet),
            InjectWhere::Replace => lines[anchor_index] == snippet,
        };
        if already {
            return Ok((
                OpStatus::Skipped,
                Some("snippet already adjacent to anchor".to_string()),
            ));
        }
    }

    match location {
        InjectWhere::Before => lines.insert(anchor_index, snippet.to_string()),
        InjectWhere::After => lines.insert(anchor_index + 1, snippet.to_string()),
        InjectWhere::Replace => lines[anchor_index] = snippet.to_string(),
    }

    if !dry_run {
        let mut output = lines.join("\n");
        if had_trailing_newline {
            output.push('\n');
        }
        write_atomic(path, &output)?;
    }
    Ok((OpStatus::Applied, None))
}

fn copy_op(from: &Path, to: &Path, dry_run: bool) -> TemplateResult<(OpStatus, Option<String>)> {
    if !from.exists() {
        return Err(TemplateError::Io(format!(
            "copy source missing: {}",
            from.display()
        )));
    }
    if !dry_run {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
    }
    Ok((OpStatus::Applied, None))
}

fn delete_op(path: &Path, dry_run: bool) -> TemplateResult<(OpStatus, Option<String>)> {
    if !path.exists() {
        return Ok((OpStatus::Skipped, Some("target missing".to_string())));
    }
    if !dry_run {
        fs::remove_file(path)?;
    }
    Ok((OpStatus::Applied, None))
}

/// Write through a uniquely-named temp file in the target directory, then
/// rename over the destination. Unique names keep concurrent writers of
/// the same path from stealing each other's temp file.
fn write_atomic(path: &Path, content: &str) -> TemplateResult<()> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let parent = path
        .parent()
        .ok_or_else(|| TemplateError::Io(format!("no parent directory: {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| TemplateError::Io(format!("no file name: {}", path.display())))?
        .to_string_lossy();
    let tmp = parent.join(format!(
        ".{}.khor-tmp.{}.{}",
        file_name,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn snippet_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
