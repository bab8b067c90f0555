//! Book table of contents
//!
//! The table of contents mirrors the chapter tree. A chapter with an index
//! becomes a section headed by that index; a chapter without one is
//! flattened into its parent. Within a chapter the order is pages, the docs
//! sub-chapter, posts, tests, modules, then the remaining sub-chapters.

use std::path::Path;

use serde::Serialize;

use crate::chapter::{self, Chapter, DISPLAY_SUFFIXES};
use crate::error::{QpubError, Result};

/// One entry of the table of contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Root-relative path without its suffix
    pub file: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<TocEntry>,
}

impl TocEntry {
    fn leaf(path: &Path) -> Self {
        Self {
            file: toc_path(path),
            sections: Vec::new(),
        }
    }

    /// Every file in the entry, depth first
    pub fn files(&self) -> Vec<&str> {
        let mut out = vec![self.file.as_str()];
        for section in &self.sections {
            out.extend(section.files());
        }
        out
    }
}

fn toc_path(path: &Path) -> String {
    path.with_extension("").to_string_lossy().replace('\\', "/")
}

fn displayable(path: &Path) -> bool {
    DISPLAY_SUFFIXES.contains(&chapter::suffix(path).as_str())
}

fn leaves<'a>(paths: impl IntoIterator<Item = &'a std::path::PathBuf>) -> Vec<TocEntry> {
    paths
        .into_iter()
        .filter(|p| displayable(p))
        .map(|p| TocEntry::leaf(p))
        .collect()
}

/// Entries below a chapter's index
fn body(chapter: &Chapter) -> Vec<TocEntry> {
    let mut entries = leaves(&chapter.pages);
    if let Some(docs) = &chapter.docs {
        entries.extend(section(docs));
    }
    entries.extend(leaves(&chapter.posts));
    entries.extend(leaves(&chapter.tests));
    entries.extend(leaves(&chapter.modules));
    for sub in &chapter.chapters {
        entries.extend(section(sub));
    }
    entries
}

/// A sub-chapter as it appears in its parent
fn section(chapter: &Chapter) -> Vec<TocEntry> {
    match chapter.index.as_deref().filter(|i| displayable(i)) {
        Some(index) => vec![TocEntry {
            file: toc_path(index),
            sections: body(chapter),
        }],
        None => body(chapter),
    }
}

/// Build the table of contents for the repository chapter
///
/// The repository index heads the book. Without one, the first displayable
/// entry is promoted. Fails with `NoIndex` when nothing can be displayed.
pub fn table_of_contents(root: &Chapter) -> Result<TocEntry> {
    let mut entries = section(root);
    if entries.is_empty() {
        return Err(QpubError::NoIndex);
    }
    if root.index.as_deref().is_some_and(displayable) {
        return Ok(entries.remove(0));
    }
    let mut top = entries.remove(0);
    top.sections.extend(entries);
    Ok(top)
}
