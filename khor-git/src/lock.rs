//! Atomic ref locks
//!
//! A lock is a ref under `refs/khor/locks/` created atomically with the
//! zero OID as the expected old value, pointing at a uniquely-valued blob.
//! Creation either succeeds or fails fast with contention; release deletes
//! the ref verifying the blob, and `Drop` releases best-effort so a
//! cancelled evaluation can never leak a lock.

use crate::backend::GitBackend;
use crate::error::{GitError, GitResult};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const ZERO_OID: &str = "0000000000000000000000000000000000000000";
const LOCK_PREFIX: &str = "refs/khor/locks/";

/// A held lock; release explicitly or let `Drop` clean up
pub struct RefLease {
    ref_name: String,
    blob: String,
    worktree: PathBuf,
    released: bool,
}

impl RefLease {
    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    /// Delete the lock ref, verifying we still own it
    pub async fn release(mut self, backend: &GitBackend) -> GitResult<()> {
        self.released = true;
        backend
            .run(&["update-ref", "-d", &self.ref_name, &self.blob])
            .await?;
        debug!(ref_name = %self.ref_name, "released ref lock");
        Ok(())
    }
}

impl Drop for RefLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Synchronous best-effort fallback; the async path is `release`
        let status = std::process::Command::new("git")
            .args(["update-ref", "-d", &self.ref_name, &self.blob])
            .current_dir(&self.worktree)
            .env("TZ", "UTC")
            .env("LANG", "C")
            .output();
        match status {
            Ok(out) if out.status.success() => {}
            _ => warn!(ref_name = %self.ref_name, "failed to release ref lock on drop"),
        }
    }
}

impl GitBackend {
    /// Try to take a lock once; contention fails fast
    pub async fn ref_lock(&self, name: &str) -> GitResult<RefLease> {
        let ref_name = format!("{}{}", LOCK_PREFIX, name);
        let token = format!("khor-lock {} {}", name, Uuid::new_v4());
        let blob = self
            .run_with_input(&["hash-object", "-w", "--stdin"], Some(&token), &[])
            .await?;
        match self
            .run(&["update-ref", &ref_name, &blob, ZERO_OID])
            .await
        {
            Ok(_) => {
                debug!(ref_name = %ref_name, "acquired ref lock");
                Ok(RefLease {
                    ref_name,
                    blob,
                    worktree: self.worktree().to_path_buf(),
                    released: false,
                })
            }
            Err(GitError::Exec { .. }) => Err(GitError::LockContended { ref_name }),
            Err(other) => Err(other),
        }
    }

    /// Take a lock, retrying with bounded exponential backoff up to a deadline
    pub async fn ref_lock_with_retry(
        &self,
        name: &str,
        deadline: Duration,
    ) -> GitResult<RefLease> {
        let started = Instant::now();
        let mut backoff = Duration::from_millis(10);
        loop {
            match self.ref_lock(name).await {
                Ok(lease) => return Ok(lease),
                Err(GitError::LockContended { ref_name }) => {
                    if started.elapsed() + backoff > deadline {
                        return Err(GitError::LockContended { ref_name });
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_millis(200));
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{git_available, scratch_repo};

    #[tokio::test]
    async fn lock_excludes_second_holder() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let lease = repo.ref_lock("notes").await.unwrap();
        let contended = repo.ref_lock("notes").await;
        assert!(matches!(contended, Err(GitError::LockContended { .. })));
        lease.release(&repo).await.unwrap();
        // Released: a new holder can take it
        let lease2 = repo.ref_lock("notes").await.unwrap();
        lease2.release(&repo).await.unwrap();
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let a = repo.ref_lock("alpha").await.unwrap();
        let b = repo.ref_lock("beta").await.unwrap();
        a.release(&repo).await.unwrap();
        b.release(&repo).await.unwrap();
    }

    #[tokio::test]
    async fn drop_releases_the_lock() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        {
            let _lease = repo.ref_lock("dropped").await.unwrap();
            // Falls out of scope without an explicit release
        }
        let lease = repo.ref_lock("dropped").await.unwrap();
        lease.release(&repo).await.unwrap();
    }

    #[tokio::test]
    async fn retry_acquires_after_release() {
        if !git_available() {
            return;
        }
        let (_dir, repo) = scratch_repo().await;
        let lease = repo.ref_lock("busy").await.unwrap();
        let err = repo
            .ref_lock_with_retry("busy", Duration::from_millis(50))
            .await;
        assert!(matches!(err, Err(GitError::LockContended { .. })));
        lease.release(&repo).await.unwrap();
        let lease = repo
            .ref_lock_with_retry("busy", Duration::from_millis(500))
            .await
            .unwrap();
        lease.release(&repo).await.unwrap();
    }
}
