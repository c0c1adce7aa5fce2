//! Predicate evaluation
//!
//! Predicates are pure in (snapshot, definition, baselines). A delta
//! predicate proposes its new baseline hash in the verdict; the caller
//! persists it only after the receipt write succeeds, so a failed persist
//! fires again on the next tick (at-least-once).

use crate::baseline::BaselineStore;
use crate::error::{HookError, HookResult};
use khor_graph::GraphSnapshot;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Comparison operator for threshold predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThresholdOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl ThresholdOp {
    pub fn parse(text: &str) -> HookResult<Self> {
        match text.trim() {
            "<" => Ok(Self::Lt),
            "<=" | "≤" => Ok(Self::Le),
            "=" | "==" => Ok(Self::Eq),
            ">=" | "≥" => Ok(Self::Ge),
            ">" => Ok(Self::Gt),
            "!=" | "≠" => Ok(Self::Ne),
            other => Err(HookError::Definition(format!(
                "unknown threshold operator: {}",
                other
            ))),
        }
    }

    fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => (left - right).abs() < f64::EPSILON,
            Self::Ge => left >= right,
            Self::Gt => left > right,
            Self::Ne => (left - right).abs() >= f64::EPSILON,
        }
    }
}

/// How threshold values reduce across rows before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Any,
    All,
    Count,
    Sum,
    Avg,
}

impl Reducer {
    pub fn parse(text: &str) -> HookResult<Self> {
        match text.trim() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            other => Err(HookError::Definition(format!("unknown reducer: {}", other))),
        }
    }
}

/// The three predicate kinds
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PredicateDef {
    Ask {
        query: String,
    },
    Threshold {
        query: String,
        variable: String,
        op: ThresholdOp,
        value: f64,
        reducer: Reducer,
    },
    Delta {
        query: String,
        key_variables: Vec<String>,
        baseline_id: String,
    },
}

impl PredicateDef {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::Threshold { .. } => "threshold",
            Self::Delta { .. } => "delta",
        }
    }
}

/// The decision plus its evidence
#[derive(Debug, Clone, Serialize)]
pub struct PredicateVerdict {
    pub kind: String,
    pub fired: bool,
    pub metrics: Value,
    /// (baseline_id, new_hash) to persist after a successful receipt write
    #[serde(skip)]
    pub new_baseline: Option<(String, String)>,
}

/// Decide whether the hook fires for this snapshot
pub fn evaluate(
    def: &PredicateDef,
    snapshot: &GraphSnapshot,
    baselines: &BaselineStore,
) -> HookResult<PredicateVerdict> {
    match def {
        PredicateDef::Ask { query } => {
            let fired = snapshot.ask(query)?;
            Ok(PredicateVerdict {
                kind: "ask".to_string(),
                fired,
                metrics: json!({ "boolean": fired }),
                new_baseline: None,
            })
        }
        PredicateDef::Threshold {
            query,
            variable,
            op,
            value,
            reducer,
        } => {
            let rows = snapshot.select(query)?;
            let numbers: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.get(variable))
                .filter_map(coerce_number)
                .collect();
            let (fired, reduced) = match reducer {
                Reducer::Any => (numbers.iter().any(|n| op.compare(*n, *value)), None),
                Reducer::All => (
                    !numbers.is_empty() && numbers.iter().all(|n| op.compare(*n, *value)),
                    None,
                ),
                Reducer::Count => {
                    let count = rows.len() as f64;
                    (op.compare(count, *value), Some(count))
                }
                Reducer::Sum => {
                    let sum: f64 = numbers.iter().sum();
                    (op.compare(sum, *value), Some(sum))
                }
                Reducer::Avg => {
                    if numbers.is_empty() {
                        (false, None)
                    } else {
                        let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                        (op.compare(avg, *value), Some(avg))
                    }
                }
            };
            Ok(PredicateVerdict {
                kind: "threshold".to_string(),
                fired,
                metrics: json!({
                    "rows": rows.len(),
                    "matched": numbers.len(),
                    "reduced": reduced,
                    "threshold": value,
                }),
                new_baseline: None,
            })
        }
        PredicateDef::Delta {
            query,
            key_variables,
            baseline_id,
        } => {
            let rows = snapshot.select(query)?;
            let hash = result_set_hash(&rows, key_variables);
            let previous = baselines.get(baseline_id);
            let (fired, new_baseline) = match previous {
                // Bootstrap: record the baseline without firing
                None => (false, Some((baseline_id.clone(), hash.clone()))),
                Some(old) if old == hash => (false, None),
                Some(_) => (true, Some((baseline_id.clone(), hash.clone()))),
            };
            Ok(PredicateVerdict {
                kind: "delta".to_string(),
                fired,
                metrics: json!({
                    "rows": rows.len(),
                    "hash": hash,
                    "baselineId": baseline_id,
                }),
                new_baseline,
            })
        }
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as u8 as f64),
        _ => None,
    }
}

/// Stable hash of the rows projected onto the key variables: canonical JSON
/// per row, sorted as a set, sha-256 over the joined lines
fn result_set_hash(rows: &[khor_graph::store::BindingRow], key_variables: &[String]) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .map(|row| {
            let mut projected = serde_json::Map::new();
            for key in key_variables {
                if let Some(value) = row.get(key) {
                    projected.insert(key.clone(), value.clone());
                }
            }
            // BTreeMap ordering inside BindingRow keeps this canonical
            serde_json::to_string(&projected).unwrap_or_default()
        })
        .collect();
    lines.sort();
    lines.dedup();
    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update([0x0a]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use khor_graph::GraphStore;
    use tempfile::TempDir;

    const SCORES: &str = r#"
        @prefix ex: <https://example.org/> .
        ex:x ex:score 10 .
        ex:y ex:score 30 .
    "#;

    fn snapshot(ttl: &str) -> std::sync::Arc<GraphSnapshot> {
        let store = GraphStore::new().unwrap();
        store.ingest_turtle(ttl, None).unwrap();
        store.snapshot()
    }

    fn baselines(dir: &TempDir) -> BaselineStore {
        BaselineStore::open(dir.path().join("baselines.json")).unwrap()
    }

    #[test]
    fn ask_fires_on_match() {
        let dir = TempDir::new().unwrap();
        let def = PredicateDef::Ask {
            query: "ASK { ?s <https://example.org/score> ?v }".into(),
        };
        let verdict = evaluate(&def, &snapshot(SCORES), &baselines(&dir)).unwrap();
        assert!(verdict.fired);
        assert_eq!(verdict.kind, "ask");
    }

    #[test]
    fn threshold_any_row_satisfies() {
        let dir = TempDir::new().unwrap();
        let def = PredicateDef::Threshold {
            query: "SELECT ?score WHERE { ?s <https://example.org/score> ?score }".into(),
            variable: "score".into(),
            op: ThresholdOp::Gt,
            value: 20.0,
            reducer: Reducer::Any,
        };
        let verdict = evaluate(&def, &snapshot(SCORES), &baselines(&dir)).unwrap();
        assert!(verdict.fired);
        assert_eq!(verdict.metrics["rows"], 2);
    }

    #[test]
    fn threshold_does_not_fire_below_value() {
        // Scenario: single score of 10 against `> 20`
        let dir = TempDir::new().unwrap();
        let def = PredicateDef::Threshold {
            query: "SELECT ?score WHERE { ?s <https://example.org/score> ?score }".into(),
            variable: "score".into(),
            op: ThresholdOp::Gt,
            value: 20.0,
            reducer: Reducer::Any,
        };
        let only_ten = snapshot("@prefix ex: <https://example.org/> . ex:x ex:score 10 .");
        let verdict = evaluate(&def, &only_ten, &baselines(&dir)).unwrap();
        assert!(!verdict.fired);
    }

    #[test]
    fn threshold_reducers() {
        let dir = TempDir::new().unwrap();
        let store = baselines(&dir);
        let snap = snapshot(SCORES);
        let with = |reducer, op, value| PredicateDef::Threshold {
            query: "SELECT ?score WHERE { ?s <https://example.org/score> ?score }".into(),
            variable: "score".into(),
            op,
            value,
            reducer,
        };
        // sum = 40, avg = 20, count = 2
        assert!(evaluate(&with(Reducer::Sum, ThresholdOp::Eq, 40.0), &snap, &store).unwrap().fired);
        assert!(evaluate(&with(Reducer::Avg, ThresholdOp::Ge, 20.0), &snap, &store).unwrap().fired);
        assert!(evaluate(&with(Reducer::Count, ThresholdOp::Eq, 2.0), &snap, &store).unwrap().fired);
        assert!(!evaluate(&with(Reducer::All, ThresholdOp::Gt, 20.0), &snap, &store).unwrap().fired);
    }

    #[test]
    fn delta_bootstrap_then_stable_then_change() {
        let dir = TempDir::new().unwrap();
        let store = baselines(&dir);
        let def = PredicateDef::Delta {
            query: "SELECT ?s ?score WHERE { ?s <https://example.org/score> ?score }".into(),
            key_variables: vec!["s".into(), "score".into()],
            baseline_id: "scores".into(),
        };

        // First evaluation records a baseline without firing
        let first = evaluate(&def, &snapshot(SCORES), &store).unwrap();
        assert!(!first.fired);
        let (id, hash) = first.new_baseline.clone().unwrap();
        store.set(&id, &hash).unwrap();

        // Identical rows: no fire, no new baseline
        let second = evaluate(&def, &snapshot(SCORES), &store).unwrap();
        assert!(!second.fired);
        assert!(second.new_baseline.is_none());

        // Added row changes the set hash
        let grown = format!("{}\nex:z ex:score 99 .", SCORES.trim_end());
        let third = evaluate(&def, &snapshot(&grown), &store).unwrap();
        assert!(third.fired);
        assert!(third.new_baseline.is_some());
    }

    #[test]
    fn delta_unpersisted_baseline_fires_again() {
        let dir = TempDir::new().unwrap();
        let store = baselines(&dir);
        let def = PredicateDef::Delta {
            query: "SELECT ?s WHERE { ?s <https://example.org/score> ?score }".into(),
            key_variables: vec!["s".into()],
            baseline_id: "again".into(),
        };
        let first = evaluate(&def, &snapshot(SCORES), &store).unwrap();
        store
            .set("again", &first.new_baseline.unwrap().1)
            .unwrap();

        let grown = format!("{}\nex:z ex:score 99 .", SCORES.trim_end());
        let changed = evaluate(&def, &snapshot(&grown), &store).unwrap();
        assert!(changed.fired);
        // Baseline NOT persisted (receipt write failed, say): fires again
        let again = evaluate(&def, &snapshot(&grown), &store).unwrap();
        assert!(again.fired);
    }

    #[test]
    fn result_set_hash_is_order_insensitive() {
        use std::collections::BTreeMap;
        let row = |s: &str| {
            let mut m: BindingRowAlias = BTreeMap::new();
            m.insert("s".to_string(), serde_json::json!(s));
            m
        };
        type BindingRowAlias = khor_graph::store::BindingRow;
        let keys = vec!["s".to_string()];
        let forward = result_set_hash(&[row("a"), row("b")], &keys);
        let backward = result_set_hash(&[row("b"), row("a")], &keys);
        assert_eq!(forward, backward);
    }
}
