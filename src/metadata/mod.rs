//! Project metadata
//!
//! [`MetadataExtractor`] derives the [`Metadata`] record projected into
//! every configuration template from the chapter tree, the primary module,
//! version control and the user's overrides.

pub mod version;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::chapter::{self, Chapter, NameSource, Repository};
use crate::config::Settings;
use crate::error::{QpubError, Result};
use crate::harvest::{self, Harvester, Imports};
use crate::names::LookupCache;

/// Python version used when none is supplied or probed
pub const DEFAULT_PYTHON: &str = "3.8";

/// Test requirements every project gets
pub const BASE_TEST_REQUIRES: &[&str] = &["pytest", "pytest-sugar"];

/// Test requirements added when notebooks exist
pub const NOTEBOOK_TEST_REQUIRES: &[&str] = &["nbval", "importnb"];

/// Metadata projected into templates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub email: String,
    pub url: String,
    pub license: String,
    pub python_version: String,
    pub classifiers: Vec<String>,
    pub keywords: Vec<String>,
    /// `file:<index>` or empty
    pub long_description: String,
    pub long_description_content_type: String,
    /// Index path without the `file:` prefix
    pub index: String,
    pub requires: Vec<String>,
    /// Imports seen only under `if`/`try`, mapped like `requires`
    pub optional: Vec<String>,
    pub test_requires: Vec<String>,
    pub docs_requires: Vec<String>,
    pub exclude: Vec<String>,
    pub files: Vec<String>,
    pub dirs: Vec<String>,
    pub language: String,
    /// Root-relative path of the primary module
    pub module_path: String,
    pub notebooks: bool,
}

impl Metadata {
    /// `Name <email>`, or whichever half is known
    pub fn author_line(&self) -> String {
        match (self.author.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{} <{}>", self.author, self.email),
            (false, true) => self.author.clone(),
            (true, false) => format!("<{}>", self.email),
            (true, true) => String::new(),
        }
    }

    /// Fail with `MissingMetadata` when a field an artifact needs is empty
    pub fn require(&self, artifact: &str, fields: &[&str]) -> Result<()> {
        let value = serde_json::to_value(self)?;
        for field in fields {
            let empty = match value.get(*field) {
                Some(v) => crate::files::is_empty_value(v),
                None => true,
            };
            if empty {
                return Err(QpubError::MissingMetadata {
                    artifact: artifact.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Template context: the record plus derived helpers
    pub fn context(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "author_line".to_string(),
                serde_json::Value::String(self.author_line()),
            );
        }
        Ok(value)
    }
}

/// Content type of an index file
pub fn content_type(index: &Path) -> &'static str {
    match chapter::suffix(index).as_str() {
        "md" => "text/markdown",
        "rst" => "text/x-rst",
        _ => "text/plain",
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Python source of the primary module, linearizing notebooks
fn primary_source(root: &Path, module: &Path) -> Option<String> {
    let text = std::fs::read_to_string(root.join(module)).ok()?;
    match harvest::linearize(module, &text) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("cannot read {}: {}", module.display(), e);
            None
        }
    }
}

/// Locate the module for a user-supplied name
fn find_module(chapter: &Chapter, root: &Path, name: &str) -> Option<PathBuf> {
    [
        PathBuf::from(format!("{}.py", name)),
        PathBuf::from(name).join("__init__.py"),
        PathBuf::from("src").join(name).join("__init__.py"),
        PathBuf::from(format!("{}.ipynb", name)),
    ]
    .into_iter()
    .find(|p| root.join(p).exists())
    .or_else(|| chapter.infer_name().ok().map(|found| found.path))
}

/// Clean, map and sort import names into distribution names
fn requirement_names(
    imports: &BTreeSet<String>,
    name: &str,
    lookups: &mut LookupCache,
) -> Vec<String> {
    let candidates: Vec<String> = imports
        .iter()
        .filter(|i| i.as_str() != name && i.as_str() != "python")
        .cloned()
        .collect();
    let mut mapped: Vec<String> = lookups
        .import_to_primary(&candidates)
        .into_iter()
        .filter(|n| n != name && n.replace('-', "_") != name)
        .filter(|n| n.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
        .collect();
    mapped.sort();
    mapped.dedup();
    mapped
}

/// Harvested imports split by where they were found
#[derive(Debug, Clone, Default)]
pub struct HarvestedImports {
    pub source: Imports,
    pub tests: Imports,
    pub docs: Imports,
}

/// Harvest a chapter, separating test and documentation imports
pub fn harvest_chapter(root: &Path, chapter: &Chapter) -> Result<HarvestedImports> {
    let files = chapter.files();
    let tests: BTreeSet<PathBuf> = chapter.test_files().into_iter().collect();
    let docs: BTreeSet<PathBuf> = chapter.docs_files().into_iter().collect();

    let absolute: Vec<PathBuf> = files.iter().map(|f| root.join(f)).collect();
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let each = runtime.block_on(Harvester::new().harvest_each(&absolute))?;

    let mut harvested = HarvestedImports::default();
    for (relative, path) in files.iter().zip(&absolute) {
        let Some(imports) = each.get(path) else {
            continue;
        };
        let bucket = if tests.contains(relative) {
            &mut harvested.tests
        } else if docs.contains(relative) {
            &mut harvested.docs
        } else {
            &mut harvested.source
        };
        bucket.union(imports.clone());
    }
    Ok(harvested)
}

/// Derives a [`Metadata`] record for a repository
pub struct MetadataExtractor<'a> {
    repo: &'a Repository,
    settings: &'a Settings,
    python_version: Option<String>,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(repo: &'a Repository, settings: &'a Settings) -> Self {
        Self {
            repo,
            settings,
            python_version: None,
        }
    }

    /// Use a probed interpreter version
    pub fn with_python_version(mut self, version: Option<String>) -> Self {
        self.python_version = version;
        self
    }

    /// Name and primary module, honouring the settings override
    pub fn name(&self) -> Result<NameSource> {
        let chapter = self.repo.chapter();
        match &self.settings.metadata.name {
            Some(name) if !name.is_empty() => {
                let name = chapter::distribution_name(name)
                    .ok_or_else(|| QpubError::UnknownName(PathBuf::from(name)))?;
                let path = find_module(chapter, self.repo.root(), &name).unwrap_or_default();
                Ok(NameSource { name, path })
            }
            _ => chapter.infer_name(),
        }
    }

    /// Compute the full record, harvesting imports
    pub fn extract(&self) -> Result<Metadata> {
        let harvested = harvest_chapter(self.repo.root(), self.repo.chapter())?;
        self.extract_with(&harvested)
    }

    /// Compute the record from already harvested imports
    pub fn extract_with(&self, harvested: &HarvestedImports) -> Result<Metadata> {
        let root = self.repo.root();
        let chapter = self.repo.chapter();
        let overrides = &self.settings.metadata;
        let found = self.name()?;
        let name = found.name.clone();

        let source = if found.path.as_os_str().is_empty() {
            None
        } else {
            primary_source(root, &found.path)
        };
        let declared = source.as_deref().and_then(harvest::module_version);
        let version = match declared {
            Some(v) => version::normalize(&v)?,
            None => version::calver_today(),
        };
        let description = source
            .as_deref()
            .and_then(harvest::module_docstring)
            .unwrap_or_default();

        let (author, email) = match self.repo.vcs() {
            Some(vcs) => match vcs.last_author()? {
                Some(a) => (a.name, a.email),
                None => Default::default(),
            },
            None => Default::default(),
        };
        let url = match self.repo.vcs() {
            Some(vcs) => vcs.origin_url()?.unwrap_or_default(),
            None => String::new(),
        };

        let (long_description, content_type, index) = match &chapter.index {
            Some(index) => (
                format!("file:{}", path_text(index)),
                content_type(index).to_string(),
                path_text(index),
            ),
            None => Default::default(),
        };

        let notebooks = chapter.has_suffix("ipynb");
        let mut lookups = LookupCache::install(&self.settings.cache_root(root))?;

        let requires = requirement_names(&harvested.source.required, &name, &mut lookups);
        let questionable: BTreeSet<String> = harvested
            .source
            .questionable
            .iter()
            .filter(|i| !harvested.source.required.contains(*i))
            .cloned()
            .collect();
        let optional = requirement_names(&questionable, &name, &mut lookups);

        let mut test_imports: BTreeSet<String> =
            BASE_TEST_REQUIRES.iter().map(|s| s.to_string()).collect();
        if notebooks {
            test_imports.extend(NOTEBOOK_TEST_REQUIRES.iter().map(|s| s.to_string()));
        }
        test_imports.extend(harvested.tests.required.iter().cloned());
        let test_requires = requirement_names(&test_imports, &name, &mut lookups);

        let mut docs_imports: BTreeSet<String> = BTreeSet::new();
        docs_imports.insert(self.settings.docs.requirement().to_string());
        docs_imports.extend(harvested.docs.required.iter().cloned());
        let docs_requires = requirement_names(&docs_imports, &name, &mut lookups);
        drop(lookups);

        let (files, dirs) = chapter.include();

        let metadata = Metadata {
            name,
            version,
            description,
            author,
            email,
            url,
            license: overrides.license.clone().unwrap_or_default(),
            python_version: overrides
                .python_version
                .clone()
                .or_else(|| self.python_version.clone())
                .unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            classifiers: overrides.classifiers.clone(),
            keywords: overrides.keywords.clone(),
            long_description,
            long_description_content_type: content_type,
            index,
            requires,
            optional,
            test_requires,
            docs_requires,
            exclude: chapter.exclude.iter().cloned().collect(),
            files: files.iter().map(|p| path_text(p)).collect(),
            dirs: dirs.iter().map(|p| path_text(p)).collect(),
            language: "en".to_string(),
            module_path: path_text(&found.path),
            notebooks,
        };
        tracing::info!(
            "metadata for {} {}: {} requirements",
            metadata.name,
            metadata.version,
            metadata.requires.len()
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (name, text) in files {
            let path = temp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }
        temp
    }

    fn extract(temp: &TempDir, settings: &Settings) -> Metadata {
        let repo = Repository::scan(temp.path(), None, settings).unwrap();
        MetadataExtractor::new(&repo, settings).extract().unwrap()
    }

    #[test]
    fn test_single_file_project() {
        let temp = project(&[(
            "my_idea.py",
            "'''doc'''\n__version__ = \"0.0.1\"\nimport pandas\nimport my_idea\n",
        )]);
        let meta = extract(&temp, &Settings::default());
        assert_eq!(meta.name, "my_idea");
        assert_eq!(meta.version, "0.0.1");
        assert_eq!(meta.description, "doc");
        assert_eq!(meta.requires, vec!["pandas"]);
        assert_eq!(meta.test_requires, vec!["pytest", "pytest-sugar"]);
        assert_eq!(meta.docs_requires, vec!["jupyter-book"]);
        assert_eq!(meta.author, "");
        assert_eq!(meta.module_path, "my_idea.py");
        assert_eq!(meta.files, vec!["my_idea.py"]);
    }

    #[test]
    fn test_notebook_project() {
        let temp = project(&[(
            "my_idea.ipynb",
            r#"{"cells": [{"cell_type": "code", "source": ["import pandas"]}], "nbformat": 4}"#,
        )]);
        let meta = extract(&temp, &Settings::default());
        assert_eq!(meta.name, "my_idea");
        assert_eq!(meta.requires, vec!["pandas"]);
        assert!(meta.notebooks);
        assert!(meta.test_requires.contains(&"nbval".to_string()));
        assert!(meta.test_requires.contains(&"importnb".to_string()));
        assert!(meta.version.starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn test_notebook_primary_with_unicode_margins() {
        let notebook = serde_json::json!({
            "cells": [{"cell_type": "code", "source": ["\u{a0}import os\n", " \u{a0}import sys\n"]}],
            "nbformat": 4
        });
        let temp = project(&[("my_idea.ipynb", &notebook.to_string())]);
        let meta = extract(&temp, &Settings::default());
        assert_eq!(meta.name, "my_idea");
        assert!(meta.requires.is_empty());
        assert!(meta.notebooks);
    }

    #[test]
    fn test_tests_and_docs_split() {
        let temp = project(&[
            ("my_idea.py", "import requests\ntry:\n    import ujson\nexcept ImportError:\n    pass\n"),
            ("test_my_idea.py", "import hypothesis\nimport my_idea\n"),
            ("docs/intro.md", "```python\nimport matplotlib\n```\n"),
            ("readme.rst", "hello\n"),
        ]);
        let meta = extract(&temp, &Settings::default());
        assert_eq!(meta.requires, vec!["requests"]);
        assert_eq!(meta.optional, vec!["ujson"]);
        assert_eq!(meta.test_requires, vec!["hypothesis", "pytest", "pytest-sugar"]);
        assert_eq!(meta.docs_requires, vec!["jupyter-book", "matplotlib"]);
        assert_eq!(meta.long_description, "file:readme.rst");
        assert_eq!(meta.long_description_content_type, "text/x-rst");
    }

    #[test]
    fn test_requires_mapped_and_filtered() {
        let temp = project(&[("my_idea.py", "import sklearn\nimport yaml\nimport _private\n")]);
        let meta = extract(&temp, &Settings::default());
        assert_eq!(meta.requires, vec!["pyyaml", "scikit-learn"]);
    }

    #[test]
    fn test_overrides() {
        let temp = project(&[("a.py", ""), ("b.py", "")]);
        let mut settings = Settings::default();
        assert!(matches!(
            MetadataExtractor::new(
                &Repository::scan(temp.path(), None, &settings).unwrap(),
                &settings
            )
            .extract(),
            Err(QpubError::UnknownName(_))
        ));

        settings.metadata.name = Some("a".to_string());
        settings.metadata.license = Some("MIT".to_string());
        settings.metadata.python_version = Some("3.11".to_string());
        let meta = extract(&temp, &settings);
        assert_eq!(meta.name, "a");
        assert_eq!(meta.module_path, "a.py");
        assert_eq!(meta.license, "MIT");
        assert_eq!(meta.python_version, "3.11");
    }

    #[test]
    fn test_require_reports_missing_field() {
        let meta = Metadata {
            name: "x".to_string(),
            ..Default::default()
        };
        assert!(meta.require("pyproject.toml", &["name"]).is_ok());
        let err = meta.require("pyproject.toml", &["name", "version"]).unwrap_err();
        assert!(matches!(err, QpubError::MissingMetadata { field, .. } if field == "version"));
    }

    #[test]
    fn test_author_line() {
        let mut meta = Metadata::default();
        assert_eq!(meta.author_line(), "");
        meta.author = "Jane".to_string();
        meta.email = "j@x.org".to_string();
        assert_eq!(meta.author_line(), "Jane <j@x.org>");
    }
}
