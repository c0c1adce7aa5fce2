//! Hook discovery
//!
//! Scans hook directories for Turtle files, ingests them into the hooks
//! graph, and materializes every subject typed `kh:Hook`. A bad file or a
//! bad hook definition disables only itself; the rest keep loading.

use crate::error::{HookError, HookResult};
use crate::model::{Hook, Trigger};
use crate::predicate::{PredicateDef, Reducer, ThresholdOp};
use khor_graph::{GraphSnapshot, GraphStore};
use khor_workflow::rdf_list_members;
use khor_workflow::vocab::{local_name, GH_NS, KH_NS, OP_NS};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};

/// What a scan found
#[derive(Debug, Default)]
pub struct HookLoadReport {
    pub hooks: Vec<Hook>,
    /// (source, reason) for every definition that failed to load
    pub errors: Vec<(String, String)>,
    pub files_ingested: usize,
}

/// Ingest every `*.ttl` under `dirs` into `hooks_graph` and load the hooks
pub fn scan_dirs(hooks_graph: &GraphStore, dirs: &[PathBuf]) -> HookResult<HookLoadReport> {
    let mut report = HookLoadReport::default();

    let mut files: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "hook directory not readable");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("ttl") {
                files.push(path);
            }
        }
    }
    files.sort();

    for path in files {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                report
                    .errors
                    .push((path.display().to_string(), e.to_string()));
                continue;
            }
        };
        match hooks_graph.ingest_turtle_file(&text, None, &path.display().to_string()) {
            Ok(_) => report.files_ingested += 1,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "hook file failed to parse");
                report
                    .errors
                    .push((path.display().to_string(), e.to_string()));
            }
        }
    }

    let snapshot = hooks_graph.snapshot();
    let iris = hook_iris(&snapshot)?;
    for iri in iris {
        match load_hook(&snapshot, &iri) {
            Ok(hook) => report.hooks.push(hook),
            Err(e) => {
                warn!(hook = %iri, error = %e, "hook definition rejected");
                report.errors.push((iri, e.to_string()));
            }
        }
    }
    info!(
        hooks = report.hooks.len(),
        errors = report.errors.len(),
        files = report.files_ingested,
        "hook scan complete"
    );
    Ok(report)
}

fn hook_iris(snapshot: &GraphSnapshot) -> HookResult<Vec<String>> {
    let rows = snapshot.select(&format!(
        "SELECT ?hook WHERE {{ ?hook a <{}Hook> }} ORDER BY ?hook",
        KH_NS
    ))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.get("hook").and_then(Value::as_str).map(ToString::to_string))
        .collect())
}

/// Materialize one hook from the graph
pub fn load_hook(snapshot: &GraphSnapshot, hook_iri: &str) -> HookResult<Hook> {
    let attrs = snapshot.select(&format!(
        "SELECT ?title ?disabled WHERE {{\n\
           OPTIONAL {{ <{h}> <{kh}title> ?title }}\n\
           OPTIONAL {{ <{h}> <{kh}disabled> ?disabled }}\n\
         }}",
        h = hook_iri,
        kh = KH_NS
    ))?;
    let (title, disabled) = attrs
        .first()
        .map(|row| {
            (
                row.get("title").and_then(Value::as_str).map(ToString::to_string),
                row.get("disabled").and_then(Value::as_bool).unwrap_or(false),
            )
        })
        .unwrap_or((None, false));

    let trigger_rows = snapshot.select(&format!(
        "SELECT ?on WHERE {{ <{h}> <{kh}on> ?on }} ORDER BY ?on",
        h = hook_iri,
        kh = KH_NS
    ))?;
    let mut on = Vec::new();
    for row in trigger_rows {
        if let Some(name) = row.get("on").and_then(Value::as_str) {
            on.push(Trigger::parse(name)?);
        }
    }
    on.dedup();

    let predicate = load_predicate(snapshot, hook_iri)?;
    let pipelines = rdf_list_members(snapshot, hook_iri, &format!("{}pipelines", OP_NS))?;

    Ok(Hook {
        iri: hook_iri.to_string(),
        title,
        predicate,
        pipelines,
        on,
        disabled,
    })
}

fn load_predicate(snapshot: &GraphSnapshot, hook_iri: &str) -> HookResult<PredicateDef> {
    let rows = snapshot.select(&format!(
        "SELECT ?kind ?query ?variable ?operator ?value ?reducer ?baseline WHERE {{\n\
           <{h}> <{gh}predicate> ?p .\n\
           ?p a ?kind .\n\
           OPTIONAL {{ ?p <{gh}query> ?query }}\n\
           OPTIONAL {{ ?p <{gh}variable> ?variable }}\n\
           OPTIONAL {{ ?p <{gh}operator> ?operator }}\n\
           OPTIONAL {{ ?p <{gh}value> ?value }}\n\
           OPTIONAL {{ ?p <{gh}reducer> ?reducer }}\n\
           OPTIONAL {{ ?p <{gh}baseline> ?baseline }}\n\
         }}",
        h = hook_iri,
        gh = GH_NS
    ))?;
    let row = rows
        .first()
        .ok_or_else(|| HookError::Definition(format!("hook {} has no predicate", hook_iri)))?;

    let kind_iri = row
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| HookError::Definition(format!("hook {} predicate is untyped", hook_iri)))?;
    let query = row
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            HookError::Definition(format!("hook {} predicate has no query", hook_iri))
        })?
        .to_string();

    match local_name(kind_iri) {
        "Ask" | "AskPredicate" => Ok(PredicateDef::Ask { query }),
        "SelectThreshold" | "Threshold" | "ThresholdPredicate" => {
            let variable = row
                .get("variable")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    HookError::Definition(format!(
                        "threshold predicate on {} needs a variable",
                        hook_iri
                    ))
                })?
                .to_string();
            let op = ThresholdOp::parse(row.get("operator").and_then(Value::as_str).ok_or_else(
                || {
                    HookError::Definition(format!(
                        "threshold predicate on {} needs an operator",
                        hook_iri
                    ))
                },
            )?)?;
            let value = match row.get("value") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| {
                HookError::Definition(format!(
                    "threshold predicate on {} needs a numeric value",
                    hook_iri
                ))
            })?;
            let reducer = match row.get("reducer").and_then(Value::as_str) {
                Some(text) => Reducer::parse(text)?,
                None => Reducer::default(),
            };
            Ok(PredicateDef::Threshold {
                query,
                variable,
                op,
                value,
                reducer,
            })
        }
        "ResultDelta" | "Delta" | "DeltaPredicate" => {
            let kv_rows = snapshot.select(&format!(
                "SELECT ?kv WHERE {{ <{h}> <{gh}predicate> ?p . ?p <{gh}keyVariable> ?kv }} ORDER BY ?kv",
                h = hook_iri,
                gh = GH_NS
            ))?;
            let key_variables: Vec<String> = kv_rows
                .into_iter()
                .filter_map(|r| r.get("kv").and_then(Value::as_str).map(ToString::to_string))
                .collect();
            if key_variables.is_empty() {
                return Err(HookError::Definition(format!(
                    "delta predicate on {} needs key variables",
                    hook_iri
                )));
            }
            let baseline_id = row
                .get("baseline")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .unwrap_or_else(|| hook_iri.to_string());
            Ok(PredicateDef::Delta {
                query,
                key_variables,
                baseline_id,
            })
        }
        other => Err(HookError::Definition(format!(
            "unknown predicate kind: {}",
            other
        ))),
    }
}
