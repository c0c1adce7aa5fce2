//! Template engine
//!
//! Wraps a tera instance with the custom filters registered at
//! construction. Planning renders the front-matter fields and the body
//! against the caller's variables and produces a `FilePlan`; nothing here
//! touches the filesystem.

use crate::apply::{self, ApplyOptions, ApplyResult};
use crate::error::{TemplateError, TemplateResult};
use crate::filters;
use crate::frontmatter::split_front_matter;
use crate::paths::resolve_sandboxed;
use crate::plan::{FileOp, FilePlan, Planned};
use khor_config::Clock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tera::{Context, Tera};

pub struct TemplateEngine {
    tera: Mutex<Tera>,
    root: PathBuf,
}

impl TemplateEngine {
    /// Engine sandboxed to `root` with the system clock
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Clock::System)
    }

    /// Engine with an explicit clock; fixed clocks make `date` deterministic
    pub fn with_clock(root: impl Into<PathBuf>, clock: Clock) -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        filters::register_all(&mut tera, clock);
        Self {
            tera: Mutex::new(tera),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render a bare template string against JSON variables
    pub fn render_str(&self, template: &str, vars: &Value) -> TemplateResult<String> {
        let context = json_context(vars)?;
        let mut tera = self.tera.lock().map_err(|e| {
            TemplateError::Render(format!("template engine lock poisoned: {}", e))
        })?;
        tera.render_str(template, &context)
            .map_err(|e| TemplateError::Render(render_error_chain(&e)))
    }

    /// Evaluate a front-matter `when` expression to a boolean
    fn eval_when(&self, expression: &str, vars: &Value) -> TemplateResult<bool> {
        let probe = format!("{{% if {} %}}__when_true__{{% endif %}}", expression);
        Ok(self.render_str(&probe, vars)?.contains("__when_true__"))
    }

    /// Plan a template: pure, deterministic, no filesystem access
    pub fn plan(&self, template: &str, vars: &Value) -> TemplateResult<Planned> {
        let (matter, body) = split_front_matter(template)?;
        let matter = match matter {
            Some(matter) => matter,
            None => {
                // No header: render-only template, nothing to write
                return Ok(Planned::Plan(FilePlan {
                    body: self.render_str(body, vars)?,
                    ..FilePlan::default()
                }));
            }
        };

        if let Some(when) = &matter.when {
            if !self.eval_when(when, vars)? {
                return Ok(Planned::Skipped {
                    reason: format!("when expression evaluated false: {}", when),
                });
            }
        }

        let rendered_body = self.render_str(body, vars)?;
        let mut ops = Vec::new();
        for raw_to in &matter.to {
            let to = self.render_str(raw_to, vars)?;
            let path = resolve_sandboxed(&self.root, Path::new(&to))?;
            ops.push(FileOp::Write {
                path,
                content: rendered_body.clone(),
                mode: matter.force,
            });
        }
        for inject in &matter.inject {
            let into = self.render_str(&inject.into, vars)?;
            ops.push(FileOp::Inject {
                path: resolve_sandboxed(&self.root, Path::new(&into))?,
                snippet: self.render_str(&inject.snippet, vars)?,
                anchor: self.render_str(&inject.find, vars)?,
                location: inject.location,
                once: inject.once,
            });
        }
        for copy in &matter.copy {
            let from = self.render_str(&copy.from, vars)?;
            let to = self.render_str(&copy.to, vars)?;
            ops.push(FileOp::Copy {
                from: resolve_sandboxed(&self.root, Path::new(&from))?,
                to: resolve_sandboxed(&self.root, Path::new(&to))?,
            });
        }

        Ok(Planned::Plan(FilePlan {
            ops,
            body: rendered_body,
            shell_before: render_all(self, &matter.sh.before, vars)?,
            shell_after: render_all(self, &matter.sh.after, vars)?,
            base_iri: matter.base_iri.clone(),
            query_name: matter.query_name.clone(),
            entity_type: matter.entity_type.clone(),
        }))
    }

    /// Execute a plan's operations in order
    pub fn apply(&self, plan: &FilePlan, options: &ApplyOptions) -> TemplateResult<ApplyResult> {
        apply::apply(&self.root, plan, options)
    }
}

fn render_all(
    engine: &TemplateEngine,
    templates: &[String],
    vars: &Value,
) -> TemplateResult<Vec<String>> {
    templates
        .iter()
        .map(|t| engine.render_str(t, vars))
        .collect()
}

fn json_context(vars: &Value) -> TemplateResult<Context> {
    match vars {
        Value::Null => Ok(Context::new()),
        other => Context::from_serialize(other)
            .map_err(|e| TemplateError::Render(format!("invalid template variables: {}", e))),
    }
}

/// Tera nests the useful message in error sources; flatten the chain
fn render_error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::ForceMode;
    use chrono::TimeZone;
    use chrono::Utc;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        let fixed = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        TemplateEngine::with_clock("/project", Clock::Fixed(fixed))
    }

    #[test]
    fn renders_variables_and_loops() {
        let out = engine()
            .render_str(
                "{% for u in users %}{{ u.name }};{% endfor %}",
                &json!({"users": [{"name": "a"}, {"name": "b"}]}),
            )
            .unwrap();
        assert_eq!(out, "a;b;");
    }

    #[test]
    fn plan_produces_write_op() {
        let template = "---\nto: out/{{ name }}.txt\nforce: overwrite\n---\nhello {{ name }}\n";
        let planned = engine().plan(template, &json!({"name": "world"})).unwrap();
        let plan = planned.as_plan().unwrap();
        assert_eq!(plan.ops.len(), 1);
        match &plan.ops[0] {
            FileOp::Write { path, content, mode } => {
                assert_eq!(path, &PathBuf::from("/project/out/world.txt"));
                assert_eq!(content, "hello world\n");
                assert_eq!(*mode, ForceMode::Overwrite);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let template =
            "---\nto: out/report-{{ \"now\" | date(fmt=\"YYYY-MM-DD\") }}.md\n---\n{{ n }} items\n";
        let vars = json!({"n": 3});
        let first = engine().plan(template, &vars).unwrap();
        let second = engine().plan(template, &vars).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn when_false_skips() {
        let template = "---\nto: out.txt\nwhen: \"count > 10\"\n---\nbody\n";
        let planned = engine().plan(template, &json!({"count": 3})).unwrap();
        assert!(planned.is_skipped());
    }

    #[test]
    fn when_true_plans() {
        let template = "---\nto: out.txt\nwhen: \"count > 10\"\n---\nbody\n";
        let planned = engine().plan(template, &json!({"count": 30})).unwrap();
        assert!(!planned.is_skipped());
    }

    #[test]
    fn escaping_to_path_is_rejected() {
        let template = "---\nto: ../../etc/cron.d/evil\n---\nbody\n";
        let err = engine().plan(template, &json!({}));
        assert!(matches!(err, Err(TemplateError::PathEscape { .. })));
    }

    #[test]
    fn no_front_matter_renders_body_only() {
        let planned = engine().plan("plain {{ x }}", &json!({"x": 1})).unwrap();
        let plan = planned.as_plan().unwrap();
        assert!(plan.ops.is_empty());
        assert_eq!(plan.body, "plain 1");
    }

    #[test]
    fn undefined_variable_is_a_render_error() {
        let err = engine().render_str("{{ missing.field }}", &json!({}));
        assert!(matches!(err, Err(TemplateError::Render(_))));
    }

    #[test]
    fn multiple_to_paths_produce_multiple_writes() {
        let template = "---\nto:\n  - a.txt\n  - b/deep.txt\n---\nsame body\n";
        let planned = engine().plan(template, &json!({})).unwrap();
        let plan = planned.as_plan().unwrap();
        assert_eq!(plan.ops.len(), 2);
    }

    #[test]
    fn inject_and_copy_ops_render_their_fields() {
        let template = concat!(
            "---\n",
            "inject:\n",
            "  - into: src/{{ module }}.rs\n",
            "    snippet: \"// {{ module }} hook\"\n",
            "    find: \"// INSERT_HERE\"\n",
            "    where: before\n",
            "copy:\n",
            "  - from: assets/base.cfg\n",
            "    to: out/{{ module }}.cfg\n",
            "---\n",
        );
        let planned = engine().plan(template, &json!({"module": "auth"})).unwrap();
        let plan = planned.as_plan().unwrap();
        assert_eq!(plan.ops.len(), 2);
        match &plan.ops[0] {
            FileOp::Inject { path, snippet, .. } => {
                assert_eq!(path, &PathBuf::from("/project/src/auth.rs"));
                assert_eq!(snippet, "// auth hook");
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }
}
