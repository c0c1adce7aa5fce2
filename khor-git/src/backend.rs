//! Git process invocation and porcelain-level operations

use crate::error::{GitError, GitResult};
use khor_config::ExecutionContext;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

/// Field and record separators for machine-parsable `--pretty` output
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// One commit from `log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub date: String,
    pub subject: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub max_count: Option<usize>,
    pub author: Option<String>,
    pub since: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// `Name <email>` override
    pub author: Option<String>,
    /// Extra environment for this commit only (GIT_AUTHOR_DATE and friends)
    pub env: Vec<(String, String)>,
}

/// Backend scoped to one working tree
pub struct GitBackend {
    worktree: PathBuf,
    ctx: ExecutionContext,
}

impl GitBackend {
    pub fn new(worktree: impl Into<PathBuf>, ctx: ExecutionContext) -> Self {
        Self {
            worktree: worktree.into(),
            ctx,
        }
    }

    /// Backend with the process environment
    pub fn open(worktree: impl Into<PathBuf>) -> Self {
        Self::new(worktree, ExecutionContext::from_process())
    }

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Run git with the given arguments; returns trimmed stdout
    pub(crate) async fn run(&self, args: &[&str]) -> GitResult<String> {
        self.run_with_input(args, None, &[]).await
    }

    pub(crate) async fn run_with_env(
        &self,
        args: &[&str],
        env: &[(String, String)],
    ) -> GitResult<String> {
        self.run_with_input(args, None, env).await
    }

    /// Run git, optionally feeding stdin, capturing all output
    pub(crate) async fn run_with_input(
        &self,
        args: &[&str],
        input: Option<&str>,
        extra_env: &[(String, String)],
    ) -> GitResult<String> {
        trace!(?args, worktree = %self.worktree.display(), "git");
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.worktree)
            .envs(self.ctx.env.iter())
            .env("TZ", "UTC")
            .env("LANG", "C")
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in extra_env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| GitError::Spawn(e.to_string()))?;
        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| GitError::Spawn(e.to_string()))?;
            }
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GitError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(GitError::Exec {
                args: args.iter().map(ToString::to_string).collect(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string())
    }

    /// SHA of HEAD
    pub async fn head(&self) -> GitResult<String> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    /// Current branch name
    pub async fn branch(&self) -> GitResult<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Commit log, newest first
    pub async fn log(&self, options: &LogOptions) -> GitResult<Vec<LogEntry>> {
        let pretty = format!(
            "--pretty=format:%H{s}%an{s}%ae{s}%aI{s}%s{r}",
            s = FIELD_SEP,
            r = RECORD_SEP
        );
        let mut args = vec!["log".to_string(), pretty];
        if let Some(max) = options.max_count {
            args.push(format!("--max-count={}", max));
        }
        if let Some(author) = &options.author {
            args.push(format!("--author={}", author));
        }
        if let Some(since) = &options.since {
            args.push(format!("--since={}", since));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self.run(&arg_refs).await?;

        let mut entries = Vec::new();
        for record in raw.split(RECORD_SEP) {
            let record = record.trim();
            if record.is_empty() {
                continue;
            }
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            if fields.len() != 5 {
                return Err(GitError::Parse(format!("bad log record: {record:?}")));
            }
            entries.push(LogEntry {
                sha: fields[0].to_string(),
                author_name: fields[1].to_string(),
                author_email: fields[2].to_string(),
                date: fields[3].to_string(),
                subject: fields[4].to_string(),
            });
        }
        Ok(entries)
    }

    /// Raw `git status --porcelain` output
    pub async fn status_porcelain(&self) -> GitResult<String> {
        self.run(&["status", "--porcelain"]).await
    }

    pub async fn is_clean(&self) -> GitResult<bool> {
        Ok(self.status_porcelain().await?.is_empty())
    }

    pub async fn add(&self, paths: &[&str]) -> GitResult<()> {
        let mut args = vec!["add"];
        args.extend_from_slice(paths);
        self.run(&args).await?;
        Ok(())
    }

    pub async fn commit(&self, message: &str, options: &CommitOptions) -> GitResult<String> {
        let mut args = vec!["commit".to_string(), "-m".to_string(), message.to_string()];
        if let Some(author) = &options.author {
            args.push(format!("--author={}", author));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_with_env(&arg_refs, &options.env).await?;
        self.head().await
    }

    pub async fn tag(&self, name: &str, message: Option<&str>) -> GitResult<()> {
        match message {
            Some(msg) => self.run(&["tag", "-a", name, "-m", msg]).await?,
            None => self.run(&["tag", name]).await?,
        };
        Ok(())
    }

    pub async fn checkout(&self, reference: &str) -> GitResult<()> {
        self.run(&["checkout", reference]).await?;
        Ok(())
    }

    pub async fn branch_create(&self, name: &str) -> GitResult<()> {
        self.run(&["branch", name]).await?;
        Ok(())
    }

    pub async fn branch_delete(&self, name: &str, force: bool) -> GitResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name]).await?;
        Ok(())
    }

    /// Initialize a repository in the worktree; used by tests and bootstrap
    pub async fn init(&self) -> GitResult<()> {
        self.run(&["init", "--initial-branch=main"]).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use khor_config::ExecutionContext;
    use tempfile::TempDir;

    /// Skip git-dependent tests on hosts without a git binary
    pub fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Fresh repository with one commit
    pub async fn scratch_repo() -> (TempDir, GitBackend) {
        let dir = TempDir::new().unwrap();
        let mut ctx = ExecutionContext::from_process();
        ctx.env
            .insert("GIT_AUTHOR_NAME".to_string(), "khor-test".to_string());
        ctx.env
            .insert("GIT_AUTHOR_EMAIL".to_string(), "test@khor.dev".to_string());
        ctx.env
            .insert("GIT_COMMITTER_NAME".to_string(), "khor-test".to_string());
        ctx.env
            .insert("GIT_COMMITTER_EMAIL".to_string(), "test@khor.dev".to_string());
        let backend = GitBackend::new(dir.path(), ctx);
        backend.init().await.unwrap();
        std::fs::write(dir.path().join("README.md"), "# scratch\n").unwrap();
        backend.add(&["README.md"]).await.unwrap();
        backend
            .commit("initial commit", &CommitOptions::default())
            .await
            .unwrap();
        (dir, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{git_available, scratch_repo};
    use super::*;

    #[tokio::test]
    async fn head_and_branch_after_commit() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let head = repo.head().await.unwrap();
        assert_eq!(head.len(), 40);
        assert_eq!(repo.branch().await.unwrap(), "main");
        assert!(repo.is_clean().await.unwrap());
    }

    #[tokio::test]
    async fn log_parses_machine_format() {
        if !git_available() {
            return;
        }
        let (dir, repo) = scratch_repo().await;
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        repo.add(&["a.txt"]).await.unwrap();
        repo.commit("add a.txt", &CommitOptions::default())
            .await
            .unwrap();

        let entries = repo
            .log(&LogOptions {
                max_count: Some(10),
                ..LogOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "add a.txt");
        assert_eq!(entries[0].author_name, "khor-test");
        assert_eq!(entries[1].subject, "initial commit");
    }

    #[tokio::test]
    async fn status_reflects_dirty_tree() {
        if !git_available() {
            return;
        }
        let (dir, repo) = scratch_repo().await;
        std::fs::write(dir.path().join("dirty.txt"), "x").unwrap();
        assert!(!repo.is_clean().await.unwrap());
        assert!(repo
            .status_porcelain()
            .await
            .unwrap()
            .contains("dirty.txt"));
    }

    #[tokio::test]
    async fn failed_command_surfaces_stderr() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let err = repo.checkout("no-such-branch").await.unwrap_err();
        match err {
            GitError::Exec { args, stderr } => {
                assert_eq!(args[0], "checkout");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn branch_lifecycle() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        repo.branch_create("feature").await.unwrap();
        repo.checkout("feature").await.unwrap();
        assert_eq!(repo.branch().await.unwrap(), "feature");
        repo.checkout("main").await.unwrap();
        repo.branch_delete("feature", false).await.unwrap();
    }

    #[tokio::test]
    async fn tag_creates_ref() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        repo.tag("v0.1.0", Some("first release")).await.unwrap();
        let out = repo.run(&["tag", "--list"]).await.unwrap();
        assert!(out.contains("v0.1.0"));
    }
}
