//! Ignore matcher
//!
//! Compiles the bundled gitignore manifests (Python, Jupyter, Jekyll) plus a
//! short built-in list into one [`globset::GlobSet`]. The matcher answers
//! "is this relative path ignored, and by which pattern?" without touching
//! the filesystem.
//!
//! Directories are queried by probing a child named `.tmp`, so a
//! directory-only pattern such as `build/` matches the directory itself.

use std::path::Path;
use std::sync::OnceLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::Result;

const PYTHON: &str = include_str!("../../data/ignore/Python.gitignore");
const JUPYTER: &str = include_str!("../../data/ignore/Jupyter.gitignore");
const JEKYLL: &str = include_str!("../../data/ignore/Jekyll.gitignore");

/// Patterns always ignored in addition to the manifests
pub const BUILTIN: &[&str] = &[
    ".git/",
    ".local/",
    ".vscode/",
    "_build/",
    "build/",
    "dist/",
    ".qpub/",
    ".doit.db*",
    ".*.qpub-tmp",
];

/// Probe appended to directory paths
const DIR_PROBE: &str = ".tmp";

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    negated: bool,
}

/// Compiled gitignore-style patterns
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
    set: GlobSet,
    /// Glob index in `set` -> rule index
    owners: Vec<usize>,
}

static BUNDLED: OnceLock<IgnoreMatcher> = OnceLock::new();

/// Non-blank, non-comment lines of a manifest
pub fn manifest_patterns(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
}

/// Translate one gitignore line into the globs that implement it
fn compile_line(line: &str) -> Option<(bool, Vec<String>)> {
    let mut pattern = line.trim();
    let negated = pattern.starts_with('!');
    if negated {
        pattern = &pattern[1..];
    }
    let pattern = pattern.replace("\\#", "#").replace("\\!", "!");

    let dir_only = pattern.ends_with('/');
    let body = pattern.trim_end_matches('/');
    if body.is_empty() {
        return None;
    }

    let anchored = body.contains('/');
    let body = body.trim_start_matches('/');
    let base = if !anchored || body.starts_with("**/") {
        if body.starts_with("**/") {
            body.to_string()
        } else {
            format!("**/{}", body)
        }
    } else {
        body.to_string()
    };

    let mut globs = vec![format!("{}/**", base)];
    if !dir_only {
        globs.insert(0, base);
    }
    Some((negated, globs))
}

impl IgnoreMatcher {
    /// Compile a list of gitignore lines
    ///
    /// Lines that do not form a valid glob are skipped with a warning.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        let mut owners = Vec::new();
        let mut builder = GlobSetBuilder::new();

        for line in patterns {
            let line = line.as_ref();
            let Some((negated, globs)) = compile_line(line) else {
                continue;
            };
            let compiled: std::result::Result<Vec<_>, _> = globs
                .iter()
                .map(|g| GlobBuilder::new(g).literal_separator(true).build())
                .collect();
            match compiled {
                Ok(compiled) => {
                    let index = rules.len();
                    rules.push(Rule {
                        pattern: line.trim().to_string(),
                        negated,
                    });
                    for glob in compiled {
                        builder.add(glob);
                        owners.push(index);
                    }
                }
                Err(e) => tracing::warn!("skipping ignore pattern {:?}: {}", line, e),
            }
        }

        Ok(Self {
            rules,
            set: builder.build()?,
            owners,
        })
    }

    /// The process-wide matcher over the bundled manifests
    pub fn bundled() -> &'static IgnoreMatcher {
        BUNDLED.get_or_init(|| {
            let lines: Vec<&str> = [PYTHON, JUPYTER, JEKYLL]
                .into_iter()
                .flat_map(manifest_patterns)
                .chain(BUILTIN.iter().copied())
                .collect();
            match IgnoreMatcher::new(lines) {
                Ok(matcher) => matcher,
                Err(e) => {
                    tracing::warn!("bundled ignore manifests failed to compile: {}", e);
                    IgnoreMatcher::empty()
                }
            }
        })
    }

    /// A matcher that ignores nothing
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            set: GlobSet::empty(),
            owners: Vec::new(),
        }
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first pattern that ignores a file path, or `None`
    ///
    /// A later negated pattern (`!keep.py`) re-includes the path, following
    /// gitignore's last-match-wins rule.
    pub fn ignored_by(&self, path: &Path) -> Option<&str> {
        let text = normalize(path);
        if text.is_empty() {
            return None;
        }
        let mut matched: Vec<usize> = self
            .set
            .matches(text.as_str())
            .into_iter()
            .map(|glob| self.owners[glob])
            .collect();
        matched.sort_unstable();
        matched.dedup();

        let last = *matched.last()?;
        if self.rules[last].negated {
            return None;
        }
        matched
            .into_iter()
            .find(|&i| !self.rules[i].negated)
            .map(|i| self.rules[i].pattern.as_str())
    }

    /// Same as [`ignored_by`](Self::ignored_by) for a directory
    pub fn dir_ignored_by(&self, dir: &Path) -> Option<&str> {
        self.ignored_by(&dir.join(DIR_PROBE))
    }

    pub fn ignored(&self, path: &Path) -> bool {
        self.ignored_by(path).is_some()
    }

    pub fn dir_ignored(&self, dir: &Path) -> bool {
        self.dir_ignored_by(dir).is_some()
    }
}

/// Forward-slash relative form used for matching
fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let text = text.trim_start_matches("./");
    text.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_manifest_lines_skip_comments() {
        let lines: Vec<_> = manifest_patterns("# c\n\n*.pyc\n  # indented\nbuild/\n").collect();
        assert_eq!(lines, vec!["*.pyc", "build/"]);
    }

    #[test]
    fn test_bundled_ignores_python_artifacts() {
        let matcher = IgnoreMatcher::bundled();
        assert_eq!(
            matcher.ignored_by(Path::new("pkg/__pycache__/mod.cpython-311.pyc")),
            Some("__pycache__/")
        );
        assert!(matcher.ignored(Path::new("a/b.pyc")));
        assert!(matcher.dir_ignored(Path::new(".ipynb_checkpoints")));
        assert!(matcher.dir_ignored(Path::new("my_idea.egg-info")));
        assert!(matcher.dir_ignored(Path::new(".git")));
        assert!(!matcher.ignored(Path::new("my_idea.py")));
        assert!(!matcher.ignored(Path::new("docs/readme.md")));
    }

    #[test]
    fn test_directory_only_patterns() {
        let matcher = IgnoreMatcher::new(["build/"]).unwrap();
        assert!(matcher.dir_ignored(Path::new("build")));
        assert!(matcher.ignored(Path::new("build/lib/x.py")));
        // a file called `build` is not a directory
        assert!(!matcher.ignored(Path::new("build")));
    }

    #[test]
    fn test_anchored_patterns() {
        let matcher = IgnoreMatcher::new(["/site", "docs/_build/"]).unwrap();
        assert!(matcher.dir_ignored(Path::new("site")));
        assert!(!matcher.dir_ignored(Path::new("pkg/site")));
        assert!(matcher.dir_ignored(Path::new("docs/_build")));
        assert!(!matcher.dir_ignored(Path::new("other/docs/_build")));
    }

    #[test]
    fn test_first_pattern_reported() {
        let matcher = IgnoreMatcher::new(["*.log", "debug.*"]).unwrap();
        assert_eq!(matcher.ignored_by(Path::new("debug.log")), Some("*.log"));
    }

    #[test]
    fn test_negation_reincludes() {
        let matcher = IgnoreMatcher::new(["*.txt", "!keep.txt"]).unwrap();
        assert!(matcher.ignored(Path::new("drop.txt")));
        assert!(!matcher.ignored(Path::new("keep.txt")));
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = IgnoreMatcher::empty();
        assert!(matcher.is_empty());
        assert!(!matcher.ignored(Path::new("anything")));
    }
}
