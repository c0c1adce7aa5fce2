//! Worktree identity and management
//!
//! Receipts and locks are scoped per worktree; the key is a short digest of
//! the common git dir plus the toplevel path, stable across invocations.

use crate::backend::GitBackend;
use crate::error::GitResult;
use sha2::{Digest, Sha256};

/// One entry from `worktree list --porcelain`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorktreeInfo {
    pub path: String,
    pub head: Option<String>,
    pub branch: Option<String>,
}

impl GitBackend {
    /// All worktrees attached to this repository
    pub async fn worktree_list(&self) -> GitResult<Vec<WorktreeInfo>> {
        let raw = self.run(&["worktree", "list", "--porcelain"]).await?;
        let mut out = Vec::new();
        let mut current = WorktreeInfo::default();
        for line in raw.lines() {
            if line.is_empty() {
                if !current.path.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                continue;
            }
            if let Some(path) = line.strip_prefix("worktree ") {
                current.path = path.to_string();
            } else if let Some(head) = line.strip_prefix("HEAD ") {
                current.head = Some(head.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                current.branch = Some(branch.to_string());
            }
        }
        if !current.path.is_empty() {
            out.push(current);
        }
        Ok(out)
    }

    /// Add a worktree at `path` checked out to `reference`
    pub async fn worktree_add(&self, path: &str, reference: Option<&str>) -> GitResult<()> {
        match reference {
            Some(r) => self.run(&["worktree", "add", path, r]).await?,
            None => self.run(&["worktree", "add", path]).await?,
        };
        Ok(())
    }

    /// Toplevel directory of the current worktree
    pub async fn worktree_root(&self) -> GitResult<String> {
        self.run(&["rev-parse", "--show-toplevel"]).await
    }

    /// Short stable identity of this worktree
    pub async fn worktree_key(&self) -> GitResult<String> {
        let common = self.run(&["rev-parse", "--git-common-dir"]).await?;
        let toplevel = self.worktree_root().await?;
        let mut hasher = Sha256::new();
        hasher.update(common.as_bytes());
        hasher.update([0]);
        hasher.update(toplevel.as_bytes());
        Ok(hex::encode(&hasher.finalize()[..6]))
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::test_support::{git_available, scratch_repo};

    #[tokio::test]
    async fn list_contains_primary_worktree() {
        if !git_available() {
            return;
        }
        let (dir, repo) = scratch_repo().await;
        let list = repo.worktree_list().await.unwrap();
        assert_eq!(list.len(), 1);
        let canonical = dir.path().canonicalize().unwrap();
        assert!(list[0].path.contains(canonical.file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn key_is_stable_and_short() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let key1 = repo.worktree_key().await.unwrap();
        let key2 = repo.worktree_key().await.unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 12);
    }

    #[tokio::test]
    async fn added_worktree_shows_in_list() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        repo.branch_create("wt-branch").await.unwrap();
        let side = tempfile::TempDir::new().unwrap();
        let wt_path = side.path().join("wt");
        let wt_str = wt_path.to_string_lossy().to_string();
        repo.worktree_add(&wt_str, Some("wt-branch")).await.unwrap();
        let list = repo.worktree_list().await.unwrap();
        assert_eq!(list.len(), 2);
        // Clean up the second tree so temp dirs can unwind
        repo.run(&["worktree", "remove", "--force", &wt_str])
            .await
            .unwrap();
    }
}
