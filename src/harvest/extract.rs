//! Static import extraction over the tree-sitter Python grammar

use std::collections::BTreeSet;
use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::{QpubError, Result};
use crate::names::get_tables;

/// External imports found in one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Imports {
    /// Imports at module or function level
    pub required: BTreeSet<String>,
    /// Imports under `if` or `try`, which may be optional
    pub questionable: BTreeSet<String>,
}

impl Imports {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.questionable.is_empty()
    }

    pub fn union(&mut self, other: Imports) {
        self.required.extend(other.required);
        self.questionable.extend(other.questionable);
    }

    /// Required and questionable together, sorted
    pub fn all(&self) -> BTreeSet<String> {
        self.required
            .union(&self.questionable)
            .cloned()
            .collect()
    }
}

/// Node kinds whose bodies run conditionally
const CONDITIONAL: &[&str] = &["if_statement", "try_statement", "conditional_expression"];

fn top_level(dotted: &str) -> &str {
    dotted.split('.').next().unwrap_or(dotted).trim()
}

/// Extract top-level external import names from Python source
///
/// Relative imports and standard library modules are skipped. A source that
/// does not parse cleanly yields [`QpubError::ParseIgnored`].
pub fn extract_imports(path: &Path, source: &str) -> Result<Imports> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| QpubError::Other(format!("python grammar unavailable: {}", e)))?;

    let tree = parser.parse(source, None).ok_or_else(|| QpubError::ParseIgnored {
        path: path.to_path_buf(),
        reason: "parser returned no tree".to_string(),
    })?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(QpubError::ParseIgnored {
            path: path.to_path_buf(),
            reason: "syntax error".to_string(),
        });
    }

    let bytes = source.as_bytes();
    let tables = get_tables();
    let mut imports = Imports::default();
    let mut stack: Vec<(Node, bool)> = vec![(root, false)];

    while let Some((node, conditional)) = stack.pop() {
        let names = match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                let names: Vec<String> = node
                    .children_by_field_name("name", &mut cursor)
                    .filter_map(|child| {
                        let dotted = if child.kind() == "aliased_import" {
                            child.child_by_field_name("name")?
                        } else {
                            child
                        };
                        dotted.utf8_text(bytes).ok()
                    })
                    .map(|text| top_level(text).to_string())
                    .collect();
                names
            }
            "import_from_statement" => node
                .child_by_field_name("module_name")
                .filter(|module| module.kind() != "relative_import")
                .and_then(|module| module.utf8_text(bytes).ok())
                .map(|text| vec![top_level(text).to_string()])
                .unwrap_or_default(),
            "future_import_statement" => Vec::new(),
            kind => {
                let nested = conditional || CONDITIONAL.contains(&kind);
                let mut cursor = node.walk();
                stack.extend(node.named_children(&mut cursor).map(|c| (c, nested)));
                continue;
            }
        };

        for name in names {
            if name.is_empty() || tables.is_stdlib(&name) {
                continue;
            }
            if conditional {
                imports.questionable.insert(name);
            } else {
                imports.required.insert(name);
            }
        }
    }

    // an import seen unconditionally anywhere is required
    let required = imports.required.clone();
    imports.questionable.retain(|n| !required.contains(n));
    Ok(imports)
}

/// First line of the module docstring, if the source opens with one
pub fn module_docstring(source: &str) -> Option<String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    let mut cursor = root.walk();
    let first = root.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0).filter(|n| n.kind() == "string")?;
    let text = string.utf8_text(source.as_bytes()).ok()?;
    let body = strip_string_quotes(text)?;
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Value of a module-level `__version__ = "..."` assignment
pub fn module_version(source: &str) -> Option<String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    let bytes = source.as_bytes();
    let mut cursor = root.walk();
    let found = root.named_children(&mut cursor).find_map(|stmt| {
        if stmt.kind() != "expression_statement" {
            return None;
        }
        let assignment = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
        let left = assignment.child_by_field_name("left")?;
        if left.utf8_text(bytes).ok()? != "__version__" {
            return None;
        }
        let right = assignment
            .child_by_field_name("right")
            .filter(|n| n.kind() == "string")?;
        strip_string_quotes(right.utf8_text(bytes).ok()?).map(str::to_string)
    });
    found
}

/// Remove prefixes and quotes from a Python string literal
fn strip_string_quotes(literal: &str) -> Option<&str> {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(&body[quote.len()..body.len() - quote.len()]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn extract(source: &str) -> Imports {
        extract_imports(Path::new("x.py"), source).unwrap()
    }

    #[test]
    fn test_plain_imports() {
        let imports = extract("import pandas\nimport numpy as np, scipy.stats\nfrom sklearn.linear_model import X\n");
        assert_eq!(imports.required, set(&["numpy", "pandas", "scipy", "sklearn"]));
        assert!(imports.questionable.is_empty());
    }

    #[test]
    fn test_stdlib_relative_and_future_skipped() {
        let imports = extract("from __future__ import annotations\nimport os, sys\nfrom . import sibling\nfrom .pkg import thing\nimport json\n");
        assert!(imports.is_empty());
    }

    #[test]
    fn test_conditional_imports_are_questionable() {
        let imports = extract(
            "try:\n    import ujson as json\nexcept ImportError:\n    import simplejson\nif True:\n    import requests\n",
        );
        assert!(imports.required.is_empty());
        assert_eq!(imports.questionable, set(&["requests", "simplejson", "ujson"]));
    }

    #[test]
    fn test_required_wins_over_questionable() {
        let imports = extract("import attr\ntry:\n    import attr\nexcept ImportError:\n    pass\n");
        assert_eq!(imports.required, set(&["attr"]));
        assert!(imports.questionable.is_empty());
    }

    #[test]
    fn test_function_level_imports_are_required() {
        let imports = extract("def f():\n    import matplotlib.pyplot as plt\n    return plt\n");
        assert_eq!(imports.required, set(&["matplotlib"]));
    }

    #[test]
    fn test_syntax_error_is_parse_ignored() {
        let err = extract_imports(Path::new("bad.py"), "import pandas\ndef (:\n").unwrap_err();
        assert!(err.is_parse_ignored());
    }

    #[test]
    fn test_docstring_and_version() {
        let source = "'''doc'''\n__version__ = \"0.0.1\"\nimport pandas\n";
        assert_eq!(module_docstring(source).as_deref(), Some("doc"));
        assert_eq!(module_version(source).as_deref(), Some("0.0.1"));
    }

    #[test]
    fn test_multiline_docstring_first_line() {
        let source = "\"\"\"\n  My idea.\n\n  More text.\n\"\"\"\n";
        assert_eq!(module_docstring(source).as_deref(), Some("My idea."));
        assert_eq!(module_version(source), None);
    }
}
