//! Evaluation receipts
//!
//! One JSON object per evaluation, appended as a git note. The content
//! hash covers the canonical receipt without the hash and signature
//! fields; the Ed25519 signature (when a key is configured) covers the
//! same bytes.

use crate::error::{HookError, HookResult};
use crate::predicate::PredicateVerdict;
use ed25519_dalek::{Signer, SigningKey};
use khor_workflow::StepResult;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Terminal status of a whole evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredicateReceipt {
    pub kind: String,
    pub verdict: bool,
    pub metrics: Value,
}

impl From<&PredicateVerdict> for PredicateReceipt {
    fn from(verdict: &PredicateVerdict) -> Self {
        Self {
            kind: verdict.kind.clone(),
            verdict: verdict.fired,
            metrics: verdict.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub hook_id: String,
    /// ISO-8601 UTC
    pub fired_at: String,
    pub eval_duration_ms: u64,
    pub status: ReceiptStatus,
    pub predicate: PredicateReceipt,
    pub pipeline: Vec<StepResult>,
    pub worktree: String,
    pub commit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Receipt {
    /// Canonical bytes: the receipt serialized without hash and signature
    fn canonical_bytes(&self) -> HookResult<Vec<u8>> {
        let mut value = serde_json::to_value(self).map_err(|e| HookError::Io(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("contentHash");
            map.remove("signature");
        }
        serde_json::to_vec(&value).map_err(|e| HookError::Io(e.to_string()))
    }

    /// Compute the content hash and, when a key is present, the signature
    pub fn seal(&mut self, key: Option<&SigningKey>) -> HookResult<()> {
        let bytes = self.canonical_bytes()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        self.content_hash = hex::encode(hasher.finalize());
        if let Some(key) = key {
            self.signature = Some(hex::encode(key.sign(&bytes).to_bytes()));
        }
        Ok(())
    }

    pub fn to_json(&self) -> HookResult<String> {
        serde_json::to_string(self).map_err(|e| HookError::Io(e.to_string()))
    }
}

/// Load an Ed25519 signing key from a hex-encoded 32-byte file
pub fn load_signing_key(path: &Path) -> HookResult<SigningKey> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HookError::Signing(format!("cannot read key {}: {}", path.display(), e)))?;
    let bytes = hex::decode(text.trim())
        .map_err(|e| HookError::Signing(format!("key is not hex: {}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| HookError::Signing("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}
