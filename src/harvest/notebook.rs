//! Linearize notebooks and markup into Python source
//!
//! Notebooks contribute their code cells, each dedented, with IPython magics
//! and shell escapes removed. Markdown contributes fenced `python`/`ipython`
//! blocks; reStructuredText contributes `code-block`/`ipython` directives.

use serde_json::Value;

use crate::error::Result;

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Longest shared prefix, cut on a character boundary
fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..end]
}

/// Remove the leading whitespace shared by all non-blank lines
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix)
        .unwrap_or("");
    text.lines()
        .map(|l| l.strip_prefix(margin).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_magic(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('%') || trimmed.starts_with('!') || trimmed.ends_with('?')
}

/// Strip magics from one cell; cell magics drop the whole cell
fn clean_cell(source: &str) -> Option<String> {
    let first = source.lines().find(|l| !l.trim().is_empty())?;
    if first.trim_start().starts_with("%%") {
        return None;
    }
    let kept: Vec<&str> = source.lines().filter(|l| !is_magic(l)).collect();
    Some(dedent(&kept.join("\n")))
}

fn cell_source(cell: &Value) -> String {
    match cell.get("source") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}

/// Concatenated, dedented code-cell sources of a notebook document
pub fn notebook_source(text: &str) -> Result<String> {
    let document: Value = serde_json::from_str(text)?;
    let cells = document
        .get("cells")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let code: Vec<String> = cells
        .iter()
        .filter(|cell| cell.get("cell_type").and_then(Value::as_str) == Some("code"))
        .filter_map(|cell| clean_cell(&cell_source(cell)))
        .collect();
    Ok(code.join("\n"))
}

fn is_python_fence_info(info: &str) -> bool {
    let info = info
        .trim()
        .trim_start_matches('{')
        .trim_start_matches("code-cell}")
        .trim_start_matches("code-block}")
        .trim();
    matches!(
        info.split_whitespace().next().unwrap_or(""),
        "python" | "python3" | "py" | "ipython" | "ipython3"
    )
}

/// Python code fences of a markdown document
pub fn markdown_source(text: &str) -> String {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            Some((fence, body)) if trimmed.starts_with(fence.as_str()) => {
                blocks.push(body.join("\n"));
            }
            Some((fence, mut body)) => {
                body.push(line);
                current = Some((fence, body));
            }
            None => {
                for fence in ["```", "~~~"] {
                    if let Some(info) = trimmed.strip_prefix(fence) {
                        if is_python_fence_info(info.trim_start_matches(fence.chars().next().unwrap_or('`'))) {
                            current = Some((fence.to_string(), Vec::new()));
                        }
                        break;
                    }
                }
            }
        }
    }

    blocks
        .iter()
        .filter_map(|b| clean_cell(b))
        .collect::<Vec<_>>()
        .join("\n")
}

const RST_DIRECTIVES: &[&str] = &[
    ".. code-block:: python",
    ".. code-block:: ipython",
    ".. code:: python",
    ".. sourcecode:: python",
    ".. ipython::",
    ".. jupyter-execute::",
];

/// Strip IPython console prompts from a directive body line
fn strip_prompt(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("In [") {
        if let Some(pos) = rest.find("]:") {
            return rest[pos + 2..].strip_prefix(' ').unwrap_or(&rest[pos + 2..]);
        }
    }
    if let Some(rest) = trimmed.strip_prefix(">>> ").or_else(|| trimmed.strip_prefix("... ")) {
        return rest;
    }
    line
}

/// Python directive bodies of a reStructuredText document
pub fn rst_source(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        let opens = RST_DIRECTIVES.iter().any(|d| trimmed.starts_with(d));
        i += 1;
        if !opens {
            continue;
        }
        let mut body = Vec::new();
        while i < lines.len() {
            let line = lines[i];
            if !line.trim().is_empty() && !line.starts_with(' ') && !line.starts_with('\t') {
                break;
            }
            let inner = line.trim();
            // directive options such as `:linenos:`
            if !(body.is_empty() && inner.starts_with(':')) {
                body.push(strip_prompt(line));
            }
            i += 1;
        }
        blocks.push(body.join("\n"));
    }

    blocks
        .iter()
        .filter_map(|b| clean_cell(b))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    a\n      b\n\n    c"), "a\n  b\n\nc");
    }

    #[test]
    fn test_dedent_unicode_whitespace() {
        assert_eq!(dedent("\u{a0}x\n \u{a0}y"), "\u{a0}x\n \u{a0}y");
        assert_eq!(dedent("\u{a0}\u{a0}a\n\u{a0}\u{a0}  b"), "a\n  b");
        assert_eq!(dedent(" \u{a0}a\n \tb\n\u{3000}"), "\u{a0}a\n\tb\n");
    }

    #[test]
    fn test_notebook_with_mixed_whitespace_margins() {
        let nb = json!({
            "cells": [{"cell_type": "code", "source": ["\u{a0}import os\n", " \u{a0}import sys\n"]}]
        });
        let source = notebook_source(&nb.to_string()).unwrap();
        assert_eq!(source, "\u{a0}import os\n \u{a0}import sys");
    }

    #[test]
    fn test_notebook_code_cells() {
        let nb = json!({
            "cells": [
                {"cell_type": "markdown", "source": ["import nothing"]},
                {"cell_type": "code", "source": ["  import pandas\n", "  %matplotlib inline\n"]},
                {"cell_type": "code", "source": "%%bash\npip install x"},
                {"cell_type": "code", "source": "!ls\nimport numpy"}
            ],
            "nbformat": 4
        });
        assert_eq!(
            notebook_source(&nb.to_string()).unwrap(),
            "import pandas\nimport numpy"
        );
    }

    #[test]
    fn test_markdown_fences() {
        let md = "# Title\n\n```python\nimport pandas\n```\n\n```bash\nimport nope\n```\n\n```{code-cell} ipython3\nimport numpy\n```\n";
        assert_eq!(markdown_source(md), "import pandas\nimport numpy");
    }

    #[test]
    fn test_rst_directives() {
        let rst = "Title\n=====\n\n.. code-block:: python\n    :linenos:\n\n    import pandas\n\n.. ipython::\n\n    In [1]: import numpy\n\nAfter.\n";
        assert_eq!(rst_source(rst).trim(), "import pandas\n\nimport numpy");
    }
}
