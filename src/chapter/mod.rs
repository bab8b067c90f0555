//! Chapters
//!
//! A [`Chapter`] classifies the entries of one directory into buckets:
//!
//! | Bucket | Members |
//! |---|---|
//! | `index` | the first `readme`/`index` file (lowercase stem) |
//! | `posts` | stems shaped `YYYY-M-D-slug`, newest first |
//! | `tests` | identifier stems starting with `test_` |
//! | `modules` | other identifier stems |
//! | `pages` | remaining recognized files |
//! | `docs`, `src` | promoted sub-chapters |
//! | `chapters` | every other non-ignored sub-directory |
//! | `conventions`, `hidden`, `other` | well-known paths, ignored or dot/dash entries, unrecognized suffixes |
//!
//! Every entry lands in exactly one bucket. Paths are stored relative to the
//! repository root.

pub mod repo;

pub use repo::{Listing, Repository};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::conventions::{self, DOCS_DIR, SRC_DIR};
use crate::error::{QpubError, Result};
use crate::ignore::IgnoreMatcher;

/// Suffixes the scanner treats as content
pub const CONTENT_SUFFIXES: &[&str] = &["py", "ipynb", "md", "rst", "txt"];

/// Suffixes that can appear in a table of contents
pub const DISPLAY_SUFFIXES: &[&str] = &["md", "rst", "ipynb"];

fn post_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})-(.+)$").expect("valid post pattern")
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"))
}

/// Whether a stem is a legal module identifier
pub fn is_identifier(stem: &str) -> bool {
    identifier_regex().is_match(stem)
}

/// Split a post stem into its date and slug
pub fn post_parts(stem: &str) -> Option<((u32, u32, u32), String)> {
    let caps = post_regex().captures(stem)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    Some(((num(1)?, num(2)?, num(3)?), caps.get(4)?.as_str().to_string()))
}

pub fn suffix(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_hidden_name(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let n = n.to_string_lossy();
            n.starts_with('.') || n.starts_with('-')
        })
        .unwrap_or(false)
}

/// Bucket a single file falls into, ignoring conventions and hidden files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Index,
    Post,
    Test,
    Module,
    Page,
    Other,
}

/// Classify a file by suffix and stem
pub fn classify(path: &Path) -> Kind {
    if !CONTENT_SUFFIXES.contains(&suffix(path).as_str()) {
        return Kind::Other;
    }
    let stem = stem(path);
    let lower = stem.to_lowercase();
    if lower == "readme" || lower == "index" {
        Kind::Index
    } else if post_parts(&stem).is_some() {
        Kind::Post
    } else if is_identifier(&stem) && stem.starts_with("test_") {
        Kind::Test
    } else if is_identifier(&stem) {
        Kind::Module
    } else {
        Kind::Page
    }
}

/// Options shared by a chapter and its sub-chapters
pub struct ScanOptions<'a> {
    pub matcher: &'a IgnoreMatcher,
    /// User exclusions matched against root-relative paths
    pub exclude: Vec<glob::Pattern>,
}

impl<'a> ScanOptions<'a> {
    pub fn new(matcher: &'a IgnoreMatcher, exclude: &[String]) -> Self {
        Self {
            matcher,
            exclude: exclude
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect(),
        }
    }

    fn excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|p| p.matches(&text))
    }
}

/// A directory-rooted classification of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chapter {
    /// Directory, relative to the repository root; empty for the root
    pub dir: PathBuf,
    pub index: Option<PathBuf>,
    pub posts: Vec<PathBuf>,
    pub modules: Vec<PathBuf>,
    pub tests: Vec<PathBuf>,
    pub pages: Vec<PathBuf>,
    pub docs: Option<Box<Chapter>>,
    pub src: Option<Box<Chapter>>,
    pub chapters: Vec<Chapter>,
    pub conventions: Vec<PathBuf>,
    pub hidden: Vec<PathBuf>,
    pub other: Vec<PathBuf>,
    /// Ignore patterns that matched an entry of this chapter or below
    pub exclude: BTreeSet<String>,
}

impl Chapter {
    /// Classify the entries of `dir` from a listing
    pub fn build(dir: &Path, listing: &Listing, options: &ScanOptions<'_>) -> Chapter {
        let mut chapter = Chapter {
            dir: dir.to_path_buf(),
            ..Default::default()
        };

        for entry in listing.children(dir) {
            let path = &entry.path;

            if conventions::is_convention(path) {
                chapter.conventions.push(path.clone());
                continue;
            }

            let ignored_by = if entry.is_dir {
                options.matcher.dir_ignored_by(path)
            } else {
                options.matcher.ignored_by(path)
            };
            if let Some(pattern) = ignored_by {
                tracing::debug!("{} ignored by {}", path.display(), pattern);
                chapter.exclude.insert(pattern.to_string());
                chapter.hidden.push(path.clone());
                continue;
            }
            if is_hidden_name(path) || options.excluded(path) {
                chapter.hidden.push(path.clone());
                continue;
            }

            if entry.is_dir {
                let sub = Chapter::build(path, listing, options);
                chapter.exclude.extend(sub.exclude.iter().cloned());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if dir.as_os_str().is_empty() && name == DOCS_DIR {
                    chapter.docs = Some(Box::new(sub));
                } else if dir.as_os_str().is_empty() && name == SRC_DIR {
                    chapter.src = Some(Box::new(sub));
                } else {
                    chapter.chapters.push(sub);
                }
                continue;
            }

            match classify(path) {
                Kind::Index if chapter.index.is_none() => chapter.index = Some(path.clone()),
                Kind::Index | Kind::Page => chapter.pages.push(path.clone()),
                Kind::Post => chapter.posts.push(path.clone()),
                Kind::Test => chapter.tests.push(path.clone()),
                Kind::Module => chapter.modules.push(path.clone()),
                Kind::Other => chapter.other.push(path.clone()),
            }
        }

        chapter.sort();
        chapter
    }

    fn sort(&mut self) {
        for bucket in [
            &mut self.modules,
            &mut self.tests,
            &mut self.pages,
            &mut self.conventions,
            &mut self.hidden,
            &mut self.other,
        ] {
            bucket.sort();
        }
        self.chapters.sort_by(|a, b| a.dir.cmp(&b.dir));
        self.posts.sort_by(|a, b| {
            let key = |p: &PathBuf| post_parts(&stem(p)).map(|(date, _)| date);
            key(b).cmp(&key(a)).then_with(|| b.cmp(a))
        });
    }

    /// Name of the chapter's directory
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Content files of this chapter, without descending
    pub fn own_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.index.iter().cloned().collect();
        files.extend(self.pages.iter().cloned());
        files.extend(self.posts.iter().cloned());
        files.extend(self.tests.iter().cloned());
        files.extend(self.modules.iter().cloned());
        files
    }

    /// Sub-chapters in traversal order: docs, src, then the rest
    pub fn sub_chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.docs
            .as_deref()
            .into_iter()
            .chain(self.src.as_deref())
            .chain(self.chapters.iter())
    }

    /// Every content file here and below
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = self.own_files();
        for sub in self.sub_chapters() {
            files.extend(sub.files());
        }
        files
    }

    /// Test files here and below
    pub fn test_files(&self) -> Vec<PathBuf> {
        let mut files = self.tests.clone();
        for sub in self.sub_chapters() {
            files.extend(sub.test_files());
        }
        files
    }

    /// Content files of the docs sub-chapter
    pub fn docs_files(&self) -> Vec<PathBuf> {
        self.docs.as_ref().map(|d| d.files()).unwrap_or_default()
    }

    /// Distinct suffixes of every file here and below, conventions included
    pub fn suffixes(&self) -> BTreeSet<String> {
        let mut suffixes: BTreeSet<String> = self
            .files()
            .iter()
            .chain(self.all_conventions().iter())
            .map(|p| suffix(p))
            .filter(|s| !s.is_empty())
            .collect();
        for sub in self.sub_chapters() {
            suffixes.extend(sub.suffixes());
        }
        suffixes
    }

    /// Convention paths here and below
    pub fn all_conventions(&self) -> Vec<PathBuf> {
        let mut found = self.conventions.clone();
        for sub in self.sub_chapters() {
            found.extend(sub.all_conventions());
        }
        found
    }

    pub fn has_suffix(&self, wanted: &str) -> bool {
        self.files().iter().any(|p| suffix(p) == wanted)
    }

    /// Files with the given suffix, here and below
    pub fn files_with_suffix(&self, wanted: &str) -> Vec<PathBuf> {
        self.files()
            .into_iter()
            .filter(|p| suffix(p) == wanted)
            .collect()
    }

    /// Whether any file here or below can be shown in a table of contents
    pub fn has_displayable(&self) -> bool {
        self.files()
            .iter()
            .any(|p| DISPLAY_SUFFIXES.contains(&suffix(p).as_str()))
    }

    /// Top-level entries for packaging: files and sub-chapter directories
    ///
    /// A directory and a file inside it are never both listed.
    pub fn include(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let files = self.own_files();
        let dirs = self.sub_chapters().map(|c| c.dir.clone()).collect();
        (files, dirs)
    }

    /// Infer the project name and the file that best identifies it
    pub fn infer_name(&self) -> Result<NameSource> {
        let classes: [Vec<NameSource>; 6] = [
            self.src
                .as_ref()
                .map(|src| src.chapters.iter().filter_map(NameSource::from_package).collect())
                .unwrap_or_default(),
            self.chapters.iter().filter_map(NameSource::from_package).collect(),
            self.modules.iter().filter_map(NameSource::from_module).collect(),
            self.posts.iter().filter_map(NameSource::from_post).collect(),
            self.pages.iter().filter_map(NameSource::from_module).collect(),
            self.tests.iter().filter_map(NameSource::from_test).collect(),
        ];

        for candidates in classes {
            if candidates.len() == 1 {
                if let Some(found) = candidates.into_iter().next() {
                    tracing::debug!("inferred name {} from {}", found.name, found.path.display());
                    return Ok(found);
                }
            }
        }
        Err(QpubError::UnknownName(self.dir.clone()))
    }
}

/// An inferred name and the path it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSource {
    pub name: String,
    /// Primary module: the package `__init__.py`, or the file itself
    pub path: PathBuf,
}

/// Distribution-style name: dashes become underscores; leading digits reject
pub fn distribution_name(raw: &str) -> Option<String> {
    let name = raw.replace('-', "_");
    match name.chars().next() {
        Some(c) if !c.is_ascii_digit() => Some(name),
        _ => None,
    }
}

impl NameSource {
    fn from_package(chapter: &Chapter) -> Option<NameSource> {
        Some(NameSource {
            name: distribution_name(&chapter.name())?,
            path: chapter.dir.join("__init__.py"),
        })
    }

    fn from_module(path: &PathBuf) -> Option<NameSource> {
        Some(NameSource {
            name: distribution_name(&stem(path))?,
            path: path.clone(),
        })
    }

    fn from_post(path: &PathBuf) -> Option<NameSource> {
        let (_, slug) = post_parts(&stem(path))?;
        Some(NameSource {
            name: distribution_name(&slug)?,
            path: path.clone(),
        })
    }

    fn from_test(path: &PathBuf) -> Option<NameSource> {
        let stem = stem(path);
        Some(NameSource {
            name: distribution_name(stem.strip_prefix("test_")?)?,
            path: path.clone(),
        })
    }
}
