//! Front-matter parsing
//!
//! A template may start with a structured header: `---` fences for YAML,
//! `+++` fences for TOML, or a single leading line holding a JSON object
//! terminated by `;`. Unknown fields are collected and reported as
//! warnings so templates stay forward-compatible.

use crate::error::{TemplateError, TemplateResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// What to do when a write target already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ForceMode {
    #[default]
    Error,
    Overwrite,
    Append,
    SkipIfExists,
}

/// Where an injected snippet lands relative to its anchor line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum InjectWhere {
    Before,
    #[default]
    After,
    Replace,
}

/// One `inject` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectSpec {
    pub into: String,
    pub snippet: String,
    pub find: String,
    #[serde(rename = "where", default)]
    pub location: InjectWhere,
    #[serde(default = "default_once")]
    pub once: bool,
}

fn default_once() -> bool {
    true
}

/// One `copy` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopySpec {
    pub from: String,
    pub to: String,
}

/// Shell commands to run around apply; both lists go through the allow-list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ShellHooks {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

/// Parsed front-matter header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FrontMatter {
    /// Output path(s); template variables allowed
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default)]
    pub force: ForceMode,
    /// Boolean template expression; false skips the template
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub inject: Vec<InjectSpec>,
    #[serde(default)]
    pub copy: Vec<CopySpec>,
    #[serde(default)]
    pub sh: ShellHooks,
    /// Hints consumed when the template runs inside a graph context
    #[serde(default, rename = "baseIRI")]
    pub base_iri: Option<String>,
    #[serde(default, rename = "queryName")]
    pub query_name: Option<String>,
    #[serde(default, rename = "entityType")]
    pub entity_type: Option<String>,
    /// Unrecognized fields, reported via `warn!`
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Split a template into its optional front matter and body
pub fn split_front_matter(text: &str) -> TemplateResult<(Option<FrontMatter>, &str)> {
    if let Some(rest) = strip_fence_line(text, "---") {
        let (header, body) = take_until_fence(rest, "---")?;
        let matter: FrontMatter =
            serde_yaml::from_str(header).map_err(|e| TemplateError::FrontMatter(e.to_string()))?;
        return Ok((Some(warn_unknown(matter)), body));
    }
    if let Some(rest) = strip_fence_line(text, "+++") {
        let (header, body) = take_until_fence(rest, "+++")?;
        let matter: FrontMatter =
            toml::from_str(header).map_err(|e| TemplateError::FrontMatter(e.to_string()))?;
        return Ok((Some(warn_unknown(matter)), body));
    }
    // Single-line JSON object terminated by `;`
    let first_line_end = text.find('\n').unwrap_or(text.len());
    let first_line = text[..first_line_end].trim_end_matches('\r').trim();
    if first_line.starts_with('{') && first_line.ends_with(';') {
        let json = first_line.trim_end_matches(';');
        let matter: FrontMatter =
            serde_json::from_str(json).map_err(|e| TemplateError::FrontMatter(e.to_string()))?;
        let body = if first_line_end < text.len() {
            &text[first_line_end + 1..]
        } else {
            ""
        };
        return Ok((Some(warn_unknown(matter)), body));
    }
    Ok((None, text))
}

fn warn_unknown(matter: FrontMatter) -> FrontMatter {
    for key in matter.unknown.keys() {
        warn!(field = %key, "unrecognized front-matter field");
    }
    matter
}

/// If the text starts with a fence line, return what follows it
fn strip_fence_line<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(fence)?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest.strip_prefix('\n')
}

/// Split `text` at the closing fence line; errors when the fence never closes
fn take_until_fence<'a>(text: &'a str, fence: &str) -> TemplateResult<(&'a str, &'a str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == fence {
            let header = &text[..offset];
            let body = &text[offset + line.len()..];
            return Ok((header, body));
        }
        offset += line.len();
    }
    // Closing fence on the last line without a trailing newline
    if text[offset..].trim_end() == fence {
        return Ok((&text[..offset], ""));
    }
    Err(TemplateError::FrontMatter(format!(
        "unterminated {} front matter",
        fence
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_front_matter() {
        let text = "---\nto: out/report.md\nforce: overwrite\n---\nbody {{ x }}\n";
        let (matter, body) = split_front_matter(text).unwrap();
        let matter = matter.unwrap();
        assert_eq!(matter.to, vec!["out/report.md"]);
        assert_eq!(matter.force, ForceMode::Overwrite);
        assert_eq!(body, "body {{ x }}\n");
    }

    #[test]
    fn yaml_to_accepts_list() {
        let text = "---\nto:\n  - a.txt\n  - b.txt\n---\nx";
        let (matter, _) = split_front_matter(text).unwrap();
        assert_eq!(matter.unwrap().to, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn toml_front_matter() {
        let text = "+++\nto = \"out.log\"\nforce = \"skipIfExists\"\n+++\nhello";
        let (matter, body) = split_front_matter(text).unwrap();
        let matter = matter.unwrap();
        assert_eq!(matter.to, vec!["out.log"]);
        assert_eq!(matter.force, ForceMode::SkipIfExists);
        assert_eq!(body, "hello");
    }

    #[test]
    fn json_line_front_matter() {
        let text = "{ \"to\": \"out.log\", \"force\": \"append\" };\nhello\n";
        let (matter, body) = split_front_matter(text).unwrap();
        let matter = matter.unwrap();
        assert_eq!(matter.to, vec!["out.log"]);
        assert_eq!(matter.force, ForceMode::Append);
        assert_eq!(body, "hello\n");
    }

    #[test]
    fn no_front_matter() {
        let (matter, body) = split_front_matter("plain body\n").unwrap();
        assert!(matter.is_none());
        assert_eq!(body, "plain body\n");
    }

    #[test]
    fn inject_defaults() {
        let text = "---\ninject:\n  - into: src/mod.rs\n    snippet: \"// hook\"\n    find: \"// INSERT_HERE\"\n---\n";
        let (matter, _) = split_front_matter(text).unwrap();
        let inject = &matter.unwrap().inject[0];
        assert_eq!(inject.location, InjectWhere::After);
        assert!(inject.once);
    }

    #[test]
    fn unknown_fields_collected() {
        let text = "---\nto: x\nmystery: 1\n---\n";
        let (matter, _) = split_front_matter(text).unwrap();
        assert!(matter.unwrap().unknown.contains_key("mystery"));
    }

    #[test]
    fn unterminated_fence_is_an_error() {
        let err = split_front_matter("---\nto: x\nbody");
        assert!(matches!(err, Err(TemplateError::FrontMatter(_))));
    }

    #[test]
    fn when_and_sh_fields() {
        let text = "---\nto: x\nwhen: \"count > 0\"\nsh:\n  before: [\"make fmt\"]\n  after: [\"make check\"]\n---\n";
        let (matter, _) = split_front_matter(text).unwrap();
        let matter = matter.unwrap();
        assert_eq!(matter.when.as_deref(), Some("count > 0"));
        assert_eq!(matter.sh.before, vec!["make fmt"]);
        assert_eq!(matter.sh.after, vec!["make check"]);
    }
}
