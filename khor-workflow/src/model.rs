//! Pipeline and step model

use crate::error::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The five step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Sparql,
    Template,
    File,
    Http,
    Cli,
}

impl StepKind {
    /// Map a step class IRI onto its kind: the local name with a trailing
    /// `Step` suffix stripped, case-insensitively
    pub fn from_type_iri(iri: &str) -> Option<Self> {
        let local = crate::vocab::local_name(iri);
        let name = local.strip_suffix("Step").unwrap_or(local);
        match name.to_ascii_lowercase().as_str() {
            "sparql" => Some(StepKind::Sparql),
            "template" => Some(StepKind::Template),
            "file" => Some(StepKind::File),
            "http" => Some(StepKind::Http),
            "cli" | "shell" => Some(StepKind::Cli),
            _ => None,
        }
    }
}

/// Per-step failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OnError {
    #[default]
    Abort,
    Continue,
    Retry {
        attempts: u32,
        backoff_ms: u64,
    },
}

impl OnError {
    /// Parse the `onError` config value: `abort`, `continue`, or
    /// `retry(attempts, backoffMs)`
    pub fn parse(value: &Value) -> WorkflowResult<Self> {
        let Some(text) = value.as_str() else {
            return Err(WorkflowError::Definition(format!(
                "onError must be a string, got {}",
                value
            )));
        };
        let text = text.trim();
        match text {
            "abort" => return Ok(OnError::Abort),
            "continue" => return Ok(OnError::Continue),
            _ => {}
        }
        if let Some(args) = text
            .strip_prefix("retry(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = args.split(',').map(str::trim).collect();
            if let [attempts, backoff] = parts.as_slice() {
                let attempts = attempts.parse().map_err(|_| {
                    WorkflowError::Definition(format!("bad retry attempts: {}", attempts))
                })?;
                let backoff_ms = backoff.parse().map_err(|_| {
                    WorkflowError::Definition(format!("bad retry backoff: {}", backoff))
                })?;
                return Ok(OnError::Retry {
                    attempts,
                    backoff_ms,
                });
            }
        }
        Err(WorkflowError::Definition(format!(
            "unrecognized onError policy: {}",
            text
        )))
    }
}

/// One loaded step
#[derive(Debug, Clone, Serialize)]
pub struct StepDef {
    /// Step IRI
    pub id: String,
    pub kind: StepKind,
    /// Type-specific configuration; unknown Turtle properties pass through
    pub config: Map<String, Value>,
    /// Step IRIs this step waits for
    pub depends_on: Vec<String>,
    pub on_error: OnError,
}

impl StepDef {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> WorkflowResult<&str> {
        self.config_str(key)
            .ok_or_else(|| WorkflowError::MissingConfig {
                step: self.id.clone(),
                field: key.to_string(),
            })
    }
}

/// A loaded pipeline; `steps` is already in execution order
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub id: String,
    pub steps: Vec<StepDef>,
}

impl Pipeline {
    pub fn step(&self, id: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Transitive dependency closure of one step
    pub fn transitive_deps(&self, id: &str) -> std::collections::HashSet<String> {
        let mut out = std::collections::HashSet::new();
        let mut stack: Vec<&str> = self
            .step(id)
            .map(|s| s.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(dep) = stack.pop() {
            if out.insert(dep.to_string()) {
                if let Some(step) = self.step(dep) {
                    stack.extend(step.depends_on.iter().map(String::as_str));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_from_type_iri() {
        assert_eq!(
            StepKind::from_type_iri("https://khor.dev/ontology#SparqlStep"),
            Some(StepKind::Sparql)
        );
        assert_eq!(
            StepKind::from_type_iri("https://khor.dev/ontology#TemplateStep"),
            Some(StepKind::Template)
        );
        assert_eq!(
            StepKind::from_type_iri("https://khor.dev/ontology#HttpStep"),
            Some(StepKind::Http)
        );
        assert_eq!(StepKind::from_type_iri("https://khor.dev/ontology#Widget"), None);
    }

    #[test]
    fn on_error_parsing() {
        assert_eq!(OnError::parse(&json!("abort")).unwrap(), OnError::Abort);
        assert_eq!(OnError::parse(&json!("continue")).unwrap(), OnError::Continue);
        assert_eq!(
            OnError::parse(&json!("retry(3, 250)")).unwrap(),
            OnError::Retry {
                attempts: 3,
                backoff_ms: 250
            }
        );
        assert!(OnError::parse(&json!("sometimes")).is_err());
        assert!(OnError::parse(&json!(7)).is_err());
    }

    #[test]
    fn transitive_deps_walk_the_chain() {
        let step = |id: &str, deps: &[&str]| StepDef {
            id: id.to_string(),
            kind: StepKind::File,
            config: Map::new(),
            depends_on: deps.iter().map(ToString::to_string).collect(),
            on_error: OnError::Abort,
        };
        let pipeline = Pipeline {
            id: "p".into(),
            steps: vec![step("a", &[]), step("b", &["a"]), step("c", &["b"]), step("d", &[])],
        };
        let deps = pipeline.transitive_deps("c");
        assert!(deps.contains("a"));
        assert!(deps.contains("b"));
        assert!(!deps.contains("d"));
    }
}
