//! Notes refs as an append-only receipt log

use crate::backend::GitBackend;
use crate::error::{GitError, GitResult};

/// One entry from `notes list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    /// Object the note annotates (a commit for receipts)
    pub annotated: String,
    /// The note blob itself
    pub note: String,
}

impl GitBackend {
    /// Append a payload to the note for `target` under `notes_ref`
    pub async fn notes_append(
        &self,
        notes_ref: &str,
        target: &str,
        payload: &str,
    ) -> GitResult<()> {
        self.run(&[
            "notes",
            &format!("--ref={}", notes_ref),
            "append",
            "--allow-empty",
            "-m",
            payload,
            target,
        ])
        .await?;
        Ok(())
    }

    /// List all notes under `notes_ref`
    pub async fn notes_list(&self, notes_ref: &str) -> GitResult<Vec<NoteEntry>> {
        let raw = match self
            .run(&["notes", &format!("--ref={}", notes_ref), "list"])
            .await
        {
            Ok(raw) => raw,
            // A ref that never received a note lists as empty
            Err(GitError::Exec { .. }) => return Ok(Vec::new()),
            Err(other) => return Err(other),
        };
        let mut entries = Vec::new();
        for line in raw.lines() {
            let mut parts = line.split_whitespace();
            let (Some(note), Some(annotated)) = (parts.next(), parts.next()) else {
                continue;
            };
            entries.push(NoteEntry {
                annotated: annotated.to_string(),
                note: note.to_string(),
            });
        }
        Ok(entries)
    }

    /// The note text attached to `target`, if any
    pub async fn notes_show(&self, notes_ref: &str, target: &str) -> GitResult<Option<String>> {
        match self
            .run(&["notes", &format!("--ref={}", notes_ref), "show", target])
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err(GitError::Exec { stderr, .. }) if stderr.contains("no note found") => Ok(None),
            Err(other) => Err(other),
        }
    }
}
