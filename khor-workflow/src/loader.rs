//! Pipeline loading from RDF
//!
//! The pipeline's `op:steps` object is an RDF list; its declared order is
//! recovered with the rest*-counting idiom so blank list cells never need
//! to be addressed directly. Step properties are collected per subject and
//! renamed onto config fields per kind; everything unrecognized passes
//! through verbatim.

use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{OnError, Pipeline, StepDef, StepKind};
use crate::vocab::{local_name, OP_NS, RDF_NS};
use khor_graph::GraphSnapshot;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Load and order the pipeline named by `pipeline_iri`
pub fn load_pipeline(snapshot: &GraphSnapshot, pipeline_iri: &str) -> WorkflowResult<Pipeline> {
    let step_iris = list_members(snapshot, pipeline_iri)?;
    if step_iris.is_empty() {
        return Err(WorkflowError::Definition(format!(
            "pipeline {} declares no steps",
            pipeline_iri
        )));
    }

    let mut steps = Vec::with_capacity(step_iris.len());
    for step_iri in &step_iris {
        steps.push(load_step(snapshot, step_iri)?);
    }
    validate_deps(pipeline_iri, &steps)?;
    let ordered = toposort(pipeline_iri, steps)?;
    debug!(pipeline = pipeline_iri, steps = ordered.len(), "loaded pipeline");
    Ok(Pipeline {
        id: pipeline_iri.to_string(),
        steps: ordered,
    })
}

/// Members of the `op:steps` list in declared order
fn list_members(snapshot: &GraphSnapshot, pipeline_iri: &str) -> WorkflowResult<Vec<String>> {
    rdf_list_members(snapshot, pipeline_iri, &format!("{}steps", OP_NS))
}

/// Members of the RDF list at `<subject> <property> ( … )`, in declared
/// order. List cells are counted through `rdf:rest*` so blank cells never
/// need to be addressed directly.
pub fn rdf_list_members(
    snapshot: &GraphSnapshot,
    subject_iri: &str,
    property_iri: &str,
) -> WorkflowResult<Vec<String>> {
    let query = format!(
        "PREFIX rdf: <{rdf}>\n\
         SELECT ?member (COUNT(?mid) AS ?pos) WHERE {{\n\
           <{subject}> <{property}> ?list .\n\
           ?list rdf:rest* ?mid .\n\
           ?mid rdf:rest* ?elem .\n\
           ?elem rdf:first ?member .\n\
         }} GROUP BY ?elem ?member ORDER BY ?pos",
        rdf = RDF_NS,
        subject = subject_iri,
        property = property_iri,
    );
    let rows = snapshot.select(&query)?;
    let mut members = Vec::with_capacity(rows.len());
    for row in rows {
        let member = row
            .get("member")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::Definition("list member is not an IRI".into()))?;
        if member.starts_with("_:") {
            return Err(WorkflowError::Definition(format!(
                "list members must be IRIs, got blank node {}",
                member
            )));
        }
        members.push(member.to_string());
    }
    Ok(members)
}

/// Per-kind property renames from Turtle local names onto config fields
fn config_key(kind: StepKind, property: &str) -> String {
    let renamed = match (kind, property) {
        (StepKind::Sparql, "text") => "query",
        (StepKind::Template, "text") => "template",
        (StepKind::Http, "httpUrl") => "url",
        (StepKind::Http, "httpMethod") => "method",
        (StepKind::Http, "httpHeaders") => "headers",
        (StepKind::Http, "httpBody") => "body",
        other => other.1,
    };
    renamed.to_string()
}

/// Config values holding structured JSON in their Turtle literal
const JSON_VALUED: &[&str] = &["outputMapping", "headers", "args", "env", "body"];

fn load_step(snapshot: &GraphSnapshot, step_iri: &str) -> WorkflowResult<StepDef> {
    let query = format!("SELECT ?p ?o WHERE {{ <{}> ?p ?o }}", step_iri);
    let rows = snapshot.select(&query)?;
    if rows.is_empty() {
        return Err(WorkflowError::Definition(format!(
            "step {} has no description",
            step_iri
        )));
    }

    let mut kind: Option<StepKind> = None;
    let mut type_iri: Option<String> = None;
    let mut depends_on = Vec::new();
    let mut on_error = OnError::Abort;
    let mut raw_props: Vec<(String, Value)> = Vec::new();

    for row in rows {
        let Some(property) = row.get("p").and_then(Value::as_str) else {
            continue;
        };
        let Some(object) = row.get("o") else { continue };
        if property == format!("{}type", RDF_NS) {
            if let Some(iri) = object.as_str() {
                type_iri = Some(iri.to_string());
                kind = StepKind::from_type_iri(iri);
            }
            continue;
        }
        match local_name(property) {
            "dependsOn" => {
                if let Some(dep) = object.as_str() {
                    depends_on.push(dep.to_string());
                }
            }
            "onError" => on_error = OnError::parse(object)?,
            _ => raw_props.push((property.to_string(), object.clone())),
        }
    }

    let kind = kind.ok_or_else(|| {
        WorkflowError::UnknownStepType(type_iri.unwrap_or_else(|| format!("{} (untyped)", step_iri)))
    })?;

    let mut config = Map::new();
    for (property, object) in raw_props {
        // op:* properties map to bare config fields; foreign properties keep
        // their full IRI so nothing is lost
        let key = if property.starts_with(OP_NS) {
            config_key(kind, local_name(&property))
        } else {
            property
        };
        let value = if JSON_VALUED.contains(&key.as_str()) {
            parse_embedded_json(object)
        } else {
            object
        };
        config.insert(key, value);
    }
    // Deterministic dependency order regardless of binding iteration order
    depends_on.sort();
    depends_on.dedup();

    Ok(StepDef {
        id: step_iri.to_string(),
        kind,
        config,
        depends_on,
        on_error,
    })
}

/// Structured config literals arrive as JSON text; parse when they parse
fn parse_embedded_json(value: Value) -> Value {
    if let Some(text) = value.as_str() {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                return parsed;
            }
        }
    }
    value
}

fn validate_deps(pipeline_iri: &str, steps: &[StepDef]) -> WorkflowResult<()> {
    for step in steps {
        for dep in &step.depends_on {
            if !steps.iter().any(|s| &s.id == dep) {
                return Err(WorkflowError::Definition(format!(
                    "pipeline {}: step {} depends on unknown step {}",
                    pipeline_iri, step.id, dep
                )));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; ties break by declared order, cycles fail the load
fn toposort(pipeline_iri: &str, steps: Vec<StepDef>) -> WorkflowResult<Vec<StepDef>> {
    let declared_index: HashMap<String, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();
    let mut indegree: HashMap<String, usize> = steps
        .iter()
        .map(|s| (s.id.clone(), s.depends_on.len()))
        .collect();
    let mut remaining: HashMap<String, StepDef> =
        steps.into_iter().map(|s| (s.id.clone(), s)).collect();

    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        // Smallest declared index among ready steps
        let next_id = remaining
            .keys()
            .filter(|id| indegree[*id] == 0)
            .min_by_key(|id| declared_index[*id])
            .cloned();
        let Some(next_id) = next_id else {
            return Err(WorkflowError::Cycle {
                pipeline: pipeline_iri.to_string(),
            });
        };
        let step = remaining.remove(&next_id).unwrap_or_else(|| unreachable!());
        for (id, other) in &remaining {
            if other.depends_on.contains(&next_id) {
                if let Some(count) = indegree.get_mut(id) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        ordered.push(step);
    }
    Ok(ordered)
}
