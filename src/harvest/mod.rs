//! Import harvester
//!
//! Reads every content file concurrently, linearizes notebooks and markup to
//! Python source, and extracts external imports. Each file task returns a
//! `(path, imports)` pair; results are assembled only after every task has
//! joined, so no state is shared between tasks.
//!
//! A file that fails to parse contributes nothing. A file that cannot be
//! read fails the whole harvest.

pub mod extract;
pub mod notebook;

pub use extract::{extract_imports, module_docstring, module_version, Imports};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{QpubError, Result};

/// Default number of files read at once
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Suffixes the harvester reads
pub const HARVESTED_SUFFIXES: &[&str] = &["py", "ipynb", "md", "rst"];

/// Python source contained in a file's text, by suffix
pub fn linearize(path: &Path, text: &str) -> Result<Option<String>> {
    let suffix = crate::chapter::suffix(path);
    Ok(match suffix.as_str() {
        "py" => Some(text.to_string()),
        "ipynb" => Some(notebook::notebook_source(text)?),
        "md" => Some(notebook::markdown_source(text)),
        "rst" => Some(notebook::rst_source(text)),
        _ => None,
    })
}

/// Imports of one file's text; parse failures become empty results
pub fn imports_of(path: &Path, text: &str) -> Imports {
    let result = linearize(path, text).and_then(|source| match source {
        Some(source) => extract_imports(path, &source),
        None => Ok(Imports::default()),
    });
    match result {
        Ok(imports) => imports,
        Err(e) if e.is_parse_ignored() => {
            tracing::debug!("dropping {}: {}", path.display(), e);
            Imports::default()
        }
        Err(e) => {
            tracing::warn!("dropping {}: {}", path.display(), e);
            Imports::default()
        }
    }
}

async fn harvest_file(path: PathBuf) -> Result<(PathBuf, Imports)> {
    if !HARVESTED_SUFFIXES.contains(&crate::chapter::suffix(&path).as_str()) {
        return Ok((path, Imports::default()));
    }
    let text = tokio::fs::read_to_string(&path).await?;
    let imports = imports_of(&path, &text);
    tracing::debug!(
        "{}: {} required, {} questionable",
        path.display(),
        imports.required.len(),
        imports.questionable.len()
    );
    Ok((path, imports))
}

/// Bounded concurrent import harvester
#[derive(Debug, Clone)]
pub struct Harvester {
    concurrency: usize,
}

impl Default for Harvester {
    fn default() -> Self {
        Self::new()
    }
}

impl Harvester {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Harvest a set of files, one result per path
    pub async fn harvest_each(&self, paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, Imports>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for path in paths {
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| QpubError::Other(format!("harvester closed: {}", e)))?;
                harvest_file(path).await
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let (path, imports) = joined
                .map_err(|e| QpubError::Other(format!("harvest task failed: {}", e)))??;
            results.insert(path, imports);
        }
        Ok(results)
    }

    /// Union of the imports of every file
    pub async fn harvest_async(&self, paths: &[PathBuf]) -> Result<Imports> {
        let mut union = Imports::default();
        for (_, imports) in self.harvest_each(paths).await? {
            union.union(imports);
        }
        Ok(union)
    }

    /// Blocking form of [`harvest_async`](Self::harvest_async)
    pub fn harvest(&self, paths: &[PathBuf]) -> Result<Imports> {
        if paths.is_empty() {
            return Ok(Imports::default());
        }
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        runtime.block_on(self.harvest_async(paths))
    }
}

/// Harvest with default settings
pub fn harvest(paths: &[PathBuf]) -> Result<Imports> {
    Harvester::new().harvest(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_harvest_unions_files() {
        let temp = TempDir::new().unwrap();
        let paths = vec![
            write(temp.path(), "a.py", "import pandas\n"),
            write(temp.path(), "b.md", "```python\nimport numpy\n```\n"),
            write(
                temp.path(),
                "c.ipynb",
                r#"{"cells": [{"cell_type": "code", "source": ["import scipy"]}]}"#,
            ),
            write(temp.path(), "d.rst", ".. code-block:: python\n\n    import yaml\n"),
            write(temp.path(), "notes.txt", "import ignored\n"),
        ];

        let imports = Harvester::with_concurrency(2).harvest(&paths).unwrap();
        assert_eq!(imports.required, set(&["numpy", "pandas", "scipy", "yaml"]));
    }

    #[test]
    fn test_parse_failure_is_dropped() {
        let temp = TempDir::new().unwrap();
        let paths = vec![
            write(temp.path(), "good.py", "import pandas\n"),
            write(temp.path(), "bad.py", "import numpy\ndef (:\n"),
            write(temp.path(), "bad.ipynb", "not json"),
        ];
        let each = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(Harvester::new().harvest_each(&paths))
            .unwrap();
        assert_eq!(each.len(), 3);
        assert!(each[&paths[1]].is_empty());
        assert!(each[&paths[2]].is_empty());
        assert_eq!(each[&paths[0]].required, set(&["pandas"]));
    }

    #[test]
    fn test_unicode_margins_do_not_abort_harvest() {
        let temp = TempDir::new().unwrap();
        let notebook = serde_json::json!({
            "cells": [
                {"cell_type": "code", "source": ["\u{a0}import os\n", " \u{a0}import sys\n"]},
                {"cell_type": "code", "source": ["\u{a0}\u{a0}import requests\n"]}
            ]
        });
        let paths = vec![
            write(temp.path(), "good.py", "import pandas\n"),
            write(temp.path(), "odd.ipynb", &notebook.to_string()),
            write(temp.path(), "notes.md", "```python\n\u{a0}import numpy\n \u{a0}import scipy\n```\n"),
        ];

        let imports = Harvester::new().harvest(&paths).unwrap();
        assert!(imports.required.contains("pandas"));
        assert!(!imports.all().contains("os"));
    }

    #[test]
    fn test_missing_file_propagates() {
        let temp = TempDir::new().unwrap();
        let err = harvest(&[temp.path().join("gone.py")]).unwrap_err();
        assert!(matches!(err, QpubError::Io(_)));
    }

    #[test]
    fn test_empty_input() {
        assert!(harvest(&[]).unwrap().is_empty());
    }
}
