//! SPARQL step
//!
//! Runs a query against the evaluation's snapshot. The optional
//! `outputMapping` projects variables into the shared data space; mapping a
//! name to `"results"` publishes the whole row list.

use super::{interpolate_str, StepContext, StepHandler, StepOutput};
use crate::error::WorkflowResult;
use crate::model::StepDef;
use async_trait::async_trait;
use khor_graph::QueryForm;
use serde_json::{json, Value};

pub struct SparqlStep;

#[async_trait]
impl StepHandler for SparqlStep {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
        let query = interpolate_str(ctx.engine, step.require_str("query")?, &ctx.vars)?;
        let value = match khor_graph::detect_query_form(&query) {
            QueryForm::Ask => json!({ "boolean": ctx.snapshot.ask(&query)? }),
            QueryForm::Construct | QueryForm::Describe => {
                json!({ "triples": ctx.snapshot.construct(&query)? })
            }
            _ => {
                let rows = ctx.snapshot.select(&query)?;
                json!({ "results": rows })
            }
        };

        let mut output = StepOutput::ok(value.clone());
        if let Some(mapping) = step.config.get("outputMapping").and_then(Value::as_object) {
            let rows = value.get("results").cloned().unwrap_or(Value::Null);
            for (name, selector) in mapping {
                let published = match selector.as_str() {
                    Some("results") => rows.clone(),
                    Some(var) => project_variable(&rows, var),
                    None => Value::Null,
                };
                output.published.push((name.clone(), published));
            }
        }
        Ok(output)
    }
}

/// Project one variable across all rows: scalar for a single row, list
/// otherwise
fn project_variable(rows: &Value, var: &str) -> Value {
    let Some(rows) = rows.as_array() else {
        return Value::Null;
    };
    let values: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.get(var).cloned())
        .collect();
    match values.len() {
        0 => Value::Null,
        1 => values.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_collapses_single_rows() {
        let rows = json!([{ "n": 5 }]);
        assert_eq!(project_variable(&rows, "n"), json!(5));
        let many = json!([{ "n": 1 }, { "n": 2 }]);
        assert_eq!(project_variable(&many, "n"), json!([1, 2]));
        assert_eq!(project_variable(&json!([]), "n"), Value::Null);
    }
}
