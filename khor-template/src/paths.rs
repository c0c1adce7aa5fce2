//! Project-root path sandbox
//!
//! Every output path is normalized lexically and must stay under the
//! configured root. Rejection happens before any filesystem access, so a
//! refused path has no side effects.

use crate::error::{TemplateError, TemplateResult};
use std::path::{Component, Path, PathBuf};

/// Resolve `candidate` against `root`, rejecting anything that escapes it.
///
/// Relative candidates are joined onto the root; absolute candidates must
/// already point below it. `.` and `..` are folded lexically, so the check
/// holds for paths that do not exist yet.
pub fn resolve_sandboxed(root: &Path, candidate: &Path) -> TemplateResult<PathBuf> {
    let root = normalize(root);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize(&joined);
    if normalized.starts_with(&root) {
        Ok(normalized)
    } else {
        Err(TemplateError::PathEscape {
            path: candidate.display().to_string(),
        })
    }
}

/// Fold `.` and `..` without consulting the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the top leaves the path outside any root and
                // the prefix check fails, which is the intended outcome.
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
