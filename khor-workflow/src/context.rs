//! Context propagation between steps
//!
//! Outputs land under `steps[stepId]`; output mappings publish named values
//! into the shared data space tagged with their producing step, so the view
//! handed to a step can be restricted to its transitive dependencies.

use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct DataEntry {
    producer: String,
    key: String,
    value: Value,
}

/// Accumulated evaluation context
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    inputs: Map<String, Value>,
    steps: Vec<(String, Value)>,
    data: Vec<DataEntry>,
}

impl WorkflowContext {
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            inputs,
            steps: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Record a step's raw output
    pub fn record_step(&mut self, step_id: &str, output: Value) {
        self.steps.push((step_id.to_string(), output));
    }

    /// Publish a mapped output into the shared data space
    pub fn publish(&mut self, step_id: &str, key: &str, value: Value) {
        self.data.push(DataEntry {
            producer: step_id.to_string(),
            key: key.to_string(),
            value,
        });
    }

    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.steps
            .iter()
            .rev()
            .find(|(id, _)| id == step_id)
            .map(|(_, v)| v)
    }

    /// The view a step may read: inputs, data published by `visible_steps`,
    /// and those steps' raw outputs under `steps.<id>`
    pub fn view_for(&self, visible_steps: &HashSet<String>) -> Value {
        self.build_view(|producer| visible_steps.contains(producer))
    }

    /// Unrestricted view of everything accumulated so far
    pub fn full_view(&self) -> Value {
        self.build_view(|_| true)
    }

    fn build_view(&self, visible: impl Fn(&str) -> bool) -> Value {
        let mut root = self.inputs.clone();
        for entry in &self.data {
            if visible(&entry.producer) {
                root.insert(entry.key.clone(), entry.value.clone());
            }
        }
        let mut steps = Map::new();
        for (id, output) in &self.steps {
            if visible(id) {
                steps.insert(id.clone(), output.clone());
            }
        }
        root.insert("steps".to_string(), Value::Object(steps));
        Value::Object(root)
    }
}
