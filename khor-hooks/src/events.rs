//! Git trigger events

use serde::{Deserialize, Serialize};

/// The git lifecycle points hooks can bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitEventKind {
    PreCommit,
    PostCommit,
    PrePush,
    PostMerge,
    PostRewrite,
    PostCheckout,
}

impl GitEventKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pre-commit" => Some(Self::PreCommit),
            "post-commit" => Some(Self::PostCommit),
            "pre-push" => Some(Self::PrePush),
            "post-merge" => Some(Self::PostMerge),
            "post-rewrite" => Some(Self::PostRewrite),
            "post-checkout" => Some(Self::PostCheckout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PostCommit => "post-commit",
            Self::PrePush => "pre-push",
            Self::PostMerge => "post-merge",
            Self::PostRewrite => "post-rewrite",
            Self::PostCheckout => "post-checkout",
        }
    }
}

/// One emitted event: what happened, at which commit, touching which paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitEvent {
    pub kind: GitEventKind,
    pub commit: Option<String>,
    #[serde(default)]
    pub changed_paths: Vec<String>,
}

impl GitEvent {
    pub fn new(kind: GitEventKind) -> Self {
        Self {
            kind,
            commit: None,
            changed_paths: Vec::new(),
        }
    }
}
