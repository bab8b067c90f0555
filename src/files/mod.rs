//! Typed files
//!
//! A [`File`] is a path plus a [`Format`] derived from its suffix. Loading
//! never fails for a missing file; it yields the empty value of the format.
//! Dumping replaces the file contents atomically and always ends with a
//! newline. `update` is `dump(merge(load(), value))`.
//!
//! ## Formats
//!
//! | Suffix | Shape | Merge |
//! |---|---|---|
//! | `.ini`, `.cfg` | sections of key/value pairs | section and key union |
//! | `.toml` | format-preserving document | deep merge |
//! | `.yaml`, `.yml`, `.json` | ordered tree | deep merge |
//! | `.txt`, `*ignore` | lines | concatenation with dedup |

pub mod ini;
pub mod merge;
pub mod toml;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use toml_edit::DocumentMut;

use crate::error::{QpubError, Result};

pub use ini::{IniDocument, IniValue};
pub use merge::{is_empty_value, merge_values};

/// Closed set of textual formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Ini,
    Toml,
    Yaml,
    Json,
    Lines,
}

impl Format {
    /// Infer the format from a path's suffix
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext.to_lowercase().as_str() {
                "ini" | "cfg" => return Some(Format::Ini),
                "toml" => return Some(Format::Toml),
                "yaml" | "yml" => return Some(Format::Yaml),
                "json" => return Some(Format::Json),
                "txt" => return Some(Format::Lines),
                _ => {}
            }
        }
        match name.as_str() {
            ".flake8" | ".pylintrc" => Some(Format::Ini),
            n if n.starts_with('.') && n.ends_with("ignore") => Some(Format::Lines),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Ini => "ini",
            Format::Toml => "toml",
            Format::Yaml => "yaml",
            Format::Json => "json",
            Format::Lines => "lines",
        };
        write!(f, "{}", name)
    }
}

/// A loaded file value in the shape of its format
#[derive(Debug, Clone)]
pub enum Content {
    Ini(IniDocument),
    Toml(DocumentMut),
    Tree(Value),
    Lines(Vec<String>),
}

impl Content {
    /// The empty value of a format
    pub fn empty(format: Format) -> Content {
        match format {
            Format::Ini => Content::Ini(IniDocument::default()),
            Format::Toml => Content::Toml(DocumentMut::new()),
            Format::Yaml | Format::Json => Content::Tree(Value::Object(Default::default())),
            Format::Lines => Content::Lines(Vec::new()),
        }
    }

    /// Parse text in the given format
    pub fn parse(format: Format, text: &str) -> Result<Content> {
        Ok(match format {
            Format::Ini => Content::Ini(IniDocument::parse(text)),
            Format::Toml => Content::Toml(text.parse::<DocumentMut>()?),
            Format::Yaml => {
                let value: Value = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_yaml::from_str(text)?
                };
                Content::Tree(non_null(value))
            }
            Format::Json => {
                let value: Value = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(text)?
                };
                Content::Tree(non_null(value))
            }
            Format::Lines => Content::Lines(text.lines().map(str::to_string).collect()),
        })
    }

    /// Build content of a format from a plain tree
    pub fn from_json(format: Format, value: &Value) -> Result<Content> {
        Ok(match format {
            Format::Ini => Content::Ini(IniDocument::from_json(value)?),
            Format::Toml => Content::Toml(toml::document_from_json(value)?),
            Format::Yaml | Format::Json => Content::Tree(value.clone()),
            Format::Lines => Content::Lines(match value {
                Value::Array(items) => items.iter().map(scalar_text).collect(),
                Value::String(s) => s.lines().map(str::to_string).collect(),
                Value::Null => Vec::new(),
                other => {
                    return Err(QpubError::Other(format!(
                        "cannot write {} as lines",
                        other
                    )))
                }
            }),
        })
    }

    /// A plain tree view of the content
    pub fn to_json(&self) -> Value {
        match self {
            Content::Ini(doc) => doc.to_json(),
            Content::Toml(doc) => toml::table_to_json(doc.as_table()),
            Content::Tree(v) => v.clone(),
            Content::Lines(lines) => {
                Value::Array(lines.iter().cloned().map(Value::String).collect())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Ini(doc) => doc.is_empty(),
            Content::Toml(doc) => doc.as_table().is_empty(),
            Content::Tree(v) => is_empty_value(v),
            Content::Lines(lines) => lines.is_empty(),
        }
    }

    /// Structurally merge `other` into this content
    ///
    /// Mappings merge key-wise, sequences concatenate without duplicates and
    /// scalars keep the first non-empty value.
    pub fn merge(&mut self, other: Content) -> Result<()> {
        match (self, other) {
            (Content::Ini(a), Content::Ini(b)) => a.merge(b),
            (Content::Toml(a), Content::Toml(b)) => toml::merge_tables(a.as_table_mut(), b.as_table()),
            (Content::Tree(a), Content::Tree(b)) => merge_values(a, b),
            (Content::Lines(a), Content::Lines(b)) => merge::merge_lines(a, b),
            (this, other) => {
                let format = this.format();
                let converted = Content::from_json(format, &other.to_json())?;
                return this.merge(converted);
            }
        }
        Ok(())
    }

    /// Drop a top-level key so the next merge rewrites it wholesale
    pub fn remove_key(&mut self, key: &str) {
        match self {
            Content::Ini(doc) => doc.remove_section(key),
            Content::Toml(doc) => {
                doc.as_table_mut().remove(key);
            }
            Content::Tree(Value::Object(map)) => {
                map.shift_remove(key);
            }
            Content::Tree(_) | Content::Lines(_) => {}
        }
    }

    fn format(&self) -> Format {
        match self {
            Content::Ini(_) => Format::Ini,
            Content::Toml(_) => Format::Toml,
            Content::Tree(_) => Format::Json,
            Content::Lines(_) => Format::Lines,
        }
    }

    /// Canonical textual form in the given format
    pub fn render(&self, format: Format) -> Result<String> {
        let text = match (format, self) {
            (Format::Ini, Content::Ini(doc)) => doc.render(),
            (Format::Toml, Content::Toml(doc)) => doc.to_string(),
            (Format::Yaml, Content::Tree(v)) => serde_yaml::to_string(v)?,
            (Format::Json, Content::Tree(v)) => serde_json::to_string_pretty(v)?,
            (Format::Lines, Content::Lines(lines)) => lines.join("\n"),
            (format, other) => return Content::from_json(format, &other.to_json())?.render(format),
        };
        Ok(ensure_newline(text))
    }
}

fn non_null(value: Value) -> Value {
    if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn ensure_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Replace a file's contents atomically
pub fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.qpub-tmp", file_name));
    {
        let mut handle = std::fs::File::create(&tmp)?;
        handle.write_all(text.as_bytes())?;
        handle.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// A path with a format tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
    format: Format,
}

impl File {
    /// Create a typed file; fails for suffixes without a format
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path).ok_or_else(|| QpubError::UnknownFormat(path.clone()))?;
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the file, or the empty value when it does not exist
    pub fn load(&self) -> Result<Content> {
        if !self.path.exists() {
            return Ok(Content::empty(self.format));
        }
        let text = std::fs::read_to_string(&self.path)?;
        Content::parse(self.format, &text)
    }

    /// Write the canonical form of `content`
    pub fn dump(&self, content: &Content) -> Result<()> {
        let text = content.render(self.format)?;
        write_atomic(&self.path, &text)
    }

    pub fn read(&self) -> Result<Content> {
        self.load()
    }

    pub fn write(&self, content: &Content) -> Result<()> {
        self.dump(content)
    }

    /// Merge `content` into what is on disk and write the result
    pub fn update(&self, content: Content) -> Result<Content> {
        let mut current = self.load()?;
        current.merge(content)?;
        self.dump(&current)?;
        Ok(current)
    }

    /// Merge a plain tree into the file
    pub fn update_json(&self, value: &Value) -> Result<Content> {
        self.update(Content::from_json(self.format, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("setup.cfg")), Some(Format::Ini));
        assert_eq!(Format::from_path(Path::new("pyproject.toml")), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("docs/_toc.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("a.json")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("requirements.txt")), Some(Format::Lines));
        assert_eq!(Format::from_path(Path::new(".gitignore")), Some(Format::Lines));
        assert_eq!(Format::from_path(Path::new("setup.py")), None);
    }

    #[test]
    fn test_unknown_format() {
        let err = File::new("setup.py").unwrap_err();
        assert!(matches!(err, QpubError::UnknownFormat(_)));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        for name in ["a.cfg", "a.toml", "a.yaml", "a.json", "a.txt"] {
            let file = File::new(temp.path().join(name)).unwrap();
            assert!(file.load().unwrap().is_empty(), "{}", name);
        }
    }

    #[test]
    fn test_dump_ends_with_newline() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join("requirements.txt")).unwrap();
        file.dump(&Content::Lines(vec!["pandas".into(), "numpy".into()]))
            .unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "pandas\nnumpy\n");
    }

    #[test]
    fn test_yaml_preserves_key_order() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join("c.yml")).unwrap();
        file.update_json(&json!({"zeta": 1, "alpha": 2})).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    }

    #[test]
    fn test_update_merges_with_existing() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join("c.json")).unwrap();
        std::fs::write(file.path(), r#"{"a": [1], "keep": "me"}"#).unwrap();

        file.update_json(&json!({"a": [1, 2], "keep": "other", "new": true}))
            .unwrap();

        assert_eq!(
            file.load().unwrap().to_json(),
            json!({"a": [1, 2], "keep": "me", "new": true})
        );
    }

    #[test]
    fn test_toml_round_trip_keeps_comments() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join("pyproject.toml")).unwrap();
        std::fs::write(
            file.path(),
            "# my project\n[tool.black]\nline-length = 100 # wide\n",
        )
        .unwrap();

        file.update_json(&json!({"tool": {"isort": {"profile": "black"}}}))
            .unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("# my project"));
        assert!(text.contains("line-length = 100 # wide"));
        assert!(text.contains("[tool.isort]"));
    }

    #[test]
    fn test_lines_update_dedups() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join(".gitignore")).unwrap();
        std::fs::write(file.path(), "build/\n*.pyc\n").unwrap();
        file.update_json(&json!(["*.pyc", ".ipynb_checkpoints/"]))
            .unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "build/\n*.pyc\n.ipynb_checkpoints/\n");
    }

    #[test]
    fn test_load_dump_load_is_stable() {
        let temp = TempDir::new().unwrap();
        let file = File::new(temp.path().join("x.yaml")).unwrap();
        let value = json!({"dependencies": ["pandas", {"pip": ["foo"]}]});
        file.dump(&Content::Tree(value.clone())).unwrap();
        assert_eq!(file.load().unwrap().to_json(), value);
    }
}
