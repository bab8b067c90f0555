//! Data-driven templates
//!
//! A template is a JSON document whose string leaves are handlebars
//! templates rendered against the metadata context. Objects with a `$`
//! operator key are evaluated instead of copied:
//!
//! | Operator | Result |
//! |---|---|
//! | `{"$ref": f, "default": d, "required": true}` | context field `f`; `d` when empty; error when empty and required |
//! | `{"$if": f, "then": a, "else": b}` | `a` when `f` is truthy, else `b` |
//! | `{"$table": f, "value": v, "with": {...}}` | a mapping from each item of list `f` to `v` |
//! | `{"$concat": [a, b, ...]}` | the items of each list in order |
//!
//! Empty strings and empty mappings are dropped from the result, so a field
//! the extractor could not infer never reaches the output file.

use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{QpubError, Result};
use crate::files::is_empty_value;

/// A projection template
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Root-relative path of the artifact
    pub target: String,
    /// Top-level keys owned by the template, rewritten instead of merged
    #[serde(default)]
    pub replace: Vec<String>,
    /// Context fields that must be non-empty
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Verbatim text for artifacts without a structured format
    #[serde(default)]
    pub text: Option<String>,
    /// Hook repositories keyed by content suffix
    #[serde(default)]
    pub hooks: Option<Value>,
}

/// Names of the bundled templates
pub const BUNDLED: &[&str] = &[
    "flit",
    "poetry",
    "setuptools",
    "setup_cfg",
    "setup_py",
    "environment",
    "jb_config",
    "mkdocs",
    "precommit",
];

fn bundled_source(name: &str) -> Option<&'static str> {
    Some(match name {
        "flit" => include_str!("../../templates/flit.json"),
        "poetry" => include_str!("../../templates/poetry.json"),
        "setuptools" => include_str!("../../templates/setuptools.json"),
        "setup_cfg" => include_str!("../../templates/setup_cfg.json"),
        "setup_py" => include_str!("../../templates/setup_py.json"),
        "environment" => include_str!("../../templates/environment.json"),
        "jb_config" => include_str!("../../templates/jb_config.json"),
        "mkdocs" => include_str!("../../templates/mkdocs.json"),
        "precommit" => include_str!("../../templates/precommit.json"),
        _ => return None,
    })
}

impl Template {
    /// Load a bundled template by name
    pub fn bundled(name: &str) -> Result<Template> {
        let source = bundled_source(name)
            .ok_or_else(|| QpubError::Template(format!("no bundled template named {}", name)))?;
        Ok(serde_json::from_str(source)?)
    }
}

/// Whether a context value counts as true for `$if`
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(v) => !is_empty_value(v),
    }
}

/// Renders template bodies against a context
pub struct Engine {
    registry: Handlebars<'static>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    /// Render a template's body; fails when a required field is empty
    pub fn render_template(&self, template: &Template, context: &Value) -> Result<Value> {
        for field in &template.require {
            if !truthy(context.get(field)) {
                return Err(QpubError::MissingMetadata {
                    artifact: template.target.clone(),
                    field: field.clone(),
                });
            }
        }
        let body = match &template.body {
            Some(body) => self.render(&template.target, body, context)?,
            None => None,
        };
        Ok(body.unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Render one handlebars string
    pub fn render_str(&self, text: &str, context: &Value) -> Result<String> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        Ok(self.registry.render_template(text, context)?)
    }

    /// Render a node; `None` means "leave this key out"
    pub fn render(&self, artifact: &str, node: &Value, context: &Value) -> Result<Option<Value>> {
        match node {
            Value::String(text) => {
                let rendered = self.render_str(text, context)?;
                Ok((!rendered.is_empty()).then_some(Value::String(rendered)))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = self.render(artifact, item, context)? {
                        out.push(v);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::Object(map) if map.contains_key("$ref") => self.reference(artifact, map, context),
            Value::Object(map) if map.contains_key("$if") => {
                let field = map.get("$if").and_then(Value::as_str).unwrap_or_default();
                let branch = if truthy(context.get(field)) {
                    map.get("then")
                } else {
                    map.get("else")
                };
                match branch {
                    Some(branch) => self.render(artifact, branch, context),
                    None => Ok(None),
                }
            }
            Value::Object(map) if map.contains_key("$table") => self.table(artifact, map, context),
            Value::Object(map) if map.contains_key("$concat") => {
                let parts = map.get("$concat").and_then(Value::as_array).cloned().unwrap_or_default();
                let mut out = Vec::new();
                for part in &parts {
                    match self.render(artifact, part, context)? {
                        Some(Value::Array(items)) => out.extend(items),
                        Some(other) => out.push(other),
                        None => {}
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    if let Some(v) = self.render(artifact, value, context)? {
                        out.insert(key.clone(), v);
                    }
                }
                Ok((!out.is_empty()).then_some(Value::Object(out)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn reference(&self, artifact: &str, map: &Map<String, Value>, context: &Value) -> Result<Option<Value>> {
        let field = map.get("$ref").and_then(Value::as_str).unwrap_or_default();
        match context.get(field) {
            Some(value) if !is_empty_value(value) => Ok(Some(value.clone())),
            _ => {
                if let Some(default) = map.get("default") {
                    return self.render(artifact, default, context);
                }
                if map.get("required").and_then(Value::as_bool).unwrap_or(false) {
                    return Err(QpubError::MissingMetadata {
                        artifact: artifact.to_string(),
                        field: field.to_string(),
                    });
                }
                Ok(None)
            }
        }
    }

    fn table(&self, artifact: &str, map: &Map<String, Value>, context: &Value) -> Result<Option<Value>> {
        let field = map.get("$table").and_then(Value::as_str).unwrap_or_default();
        let mut out = match map.get("with") {
            Some(base) => match self.render(artifact, base, context)? {
                Some(Value::Object(base)) => base,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        let value = match map.get("value") {
            Some(v) => self.render(artifact, v, context)?.unwrap_or(Value::String("*".into())),
            None => Value::String("*".into()),
        };
        if let Some(Value::Array(items)) = context.get(field) {
            for item in items {
                if let Some(key) = item.as_str() {
                    out.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
        }
        Ok((!out.is_empty()).then_some(Value::Object(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(node: Value, context: Value) -> Option<Value> {
        Engine::new().render("test", &node, &context).unwrap()
    }

    #[test]
    fn test_all_bundled_templates_parse() {
        for name in BUNDLED {
            let template = Template::bundled(name).unwrap();
            assert!(template.body.is_some() || template.text.is_some() || template.hooks.is_some());
        }
        assert!(Template::bundled("hatch").is_err());
    }

    #[test]
    fn test_strings_render_without_escaping() {
        assert_eq!(
            render(json!("{{a}} <{{b}}>"), json!({"a": "Jane & co", "b": "j@x"})),
            Some(json!("Jane & co <j@x>"))
        );
        assert_eq!(render(json!("{{missing}}"), json!({})), None);
    }

    #[test]
    fn test_ref_default_and_required() {
        assert_eq!(render(json!({"$ref": "xs"}), json!({"xs": [1]})), Some(json!([1])));
        assert_eq!(render(json!({"$ref": "xs"}), json!({"xs": []})), None);
        assert_eq!(
            render(json!({"$ref": "xs", "default": []}), json!({})),
            Some(json!([]))
        );
        let err = Engine::new()
            .render("pyproject.toml", &json!({"$ref": "name", "required": true}), &json!({}))
            .unwrap_err();
        assert!(matches!(err, QpubError::MissingMetadata { field, .. } if field == "name"));
    }

    #[test]
    fn test_if_branches() {
        let node = json!({"$if": "flag", "then": "yes", "else": "no"});
        assert_eq!(render(node.clone(), json!({"flag": true})), Some(json!("yes")));
        assert_eq!(render(node, json!({"flag": ""})), Some(json!("no")));
        assert_eq!(render(json!({"$if": "flag", "then": "yes"}), json!({})), None);
    }

    #[test]
    fn test_table_and_concat() {
        assert_eq!(
            render(
                json!({"$table": "deps", "value": "*", "with": {"python": "^{{py}}"}}),
                json!({"deps": ["pandas"], "py": "3.8"})
            ),
            Some(json!({"python": "^3.8", "pandas": "*"}))
        );
        assert_eq!(
            render(
                json!({"$concat": [["a"], {"$ref": "b"}, {"$if": "c", "then": [{"pip": ["d"]}]}]}),
                json!({"b": ["b1", "b2"], "c": true})
            ),
            Some(json!(["a", "b1", "b2", {"pip": ["d"]}]))
        );
    }

    #[test]
    fn test_empty_mappings_are_dropped() {
        assert_eq!(
            render(json!({"outer": {"inner": "{{x}}"}, "keep": 1}), json!({})),
            Some(json!({"keep": 1}))
        );
    }

    #[test]
    fn test_required_fields_checked() {
        let template = Template::bundled("poetry").unwrap();
        let err = Engine::new()
            .render_template(&template, &json!({"name": "x"}))
            .unwrap_err();
        assert!(matches!(err, QpubError::MissingMetadata { field, .. } if field == "version"));
    }
}
