//! Repository view: a root chapter plus an optional version control adaptor

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{Chapter, ScanOptions};
use crate::config::Settings;
use crate::error::Result;
use crate::git::{GitRepository, Vcs};
use crate::ignore::IgnoreMatcher;

/// One candidate entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Candidate entries grouped by parent directory, root-relative
#[derive(Debug, Clone, Default)]
pub struct Listing {
    children: BTreeMap<PathBuf, BTreeSet<Entry>>,
}

impl Listing {
    fn add(&mut self, path: PathBuf, is_dir: bool) {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.children
            .entry(parent)
            .or_default()
            .insert(Entry { path, is_dir });
    }

    /// Build from file paths, adding every parent directory
    pub fn from_files<I: IntoIterator<Item = PathBuf>>(files: I) -> Self {
        let mut listing = Listing::default();
        for file in files {
            let mut dir = file.parent().map(Path::to_path_buf);
            while let Some(d) = dir {
                if d.as_os_str().is_empty() {
                    break;
                }
                dir = d.parent().map(Path::to_path_buf);
                listing.add(d, true);
            }
            listing.add(file, false);
        }
        listing
    }

    /// Walk the filesystem, not descending into ignored or hidden directories
    pub fn walk(root: &Path, matcher: &IgnoreMatcher) -> Result<Self> {
        let mut listing = Listing::default();
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let is_dir = entry.file_type().is_dir();
            if is_dir {
                let hidden = relative
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(false);
                if hidden || matcher.dir_ignored(&relative) {
                    walker.skip_current_dir();
                }
            }
            listing.add(relative, is_dir);
        }
        Ok(listing)
    }

    /// Direct children of a directory, sorted
    pub fn children(&self, dir: &Path) -> impl Iterator<Item = &Entry> {
        self.children.get(dir).into_iter().flat_map(|set| set.iter())
    }

    pub fn len(&self) -> usize {
        self.children.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A chapter rooted at the working directory
pub struct Repository {
    root: PathBuf,
    chapter: Chapter,
    vcs: Option<Box<dyn Vcs>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("vcs", &self.vcs.is_some())
            .finish()
    }
}

impl Repository {
    /// Scan `root`, using git when it tracks anything there
    pub fn open(root: &Path, settings: &Settings) -> Result<Self> {
        let vcs: Option<Box<dyn Vcs>> = match GitRepository::discover(root) {
            Ok(git) => Some(Box::new(git)),
            Err(e) => {
                tracing::debug!("no git repository at {}: {}", root.display(), e);
                None
            }
        };
        Self::scan(root, vcs, settings)
    }

    /// Scan `root` with an explicit adaptor
    ///
    /// With an adaptor the candidates are its tracked files; an adaptor that
    /// tracks nothing falls back to the filesystem walk.
    pub fn scan(root: &Path, vcs: Option<Box<dyn Vcs>>, settings: &Settings) -> Result<Self> {
        let matcher = IgnoreMatcher::bundled();
        let tracked = match &vcs {
            Some(vcs) => vcs.tracked_files()?,
            None => Vec::new(),
        };
        let listing = if tracked.is_empty() {
            Listing::walk(root, matcher)?
        } else {
            tracing::debug!("{} tracked files", tracked.len());
            Listing::from_files(tracked)
        };

        let options = ScanOptions::new(matcher, &settings.exclude);
        let chapter = Chapter::build(Path::new(""), &listing, &options);
        Ok(Self {
            root: root.to_path_buf(),
            chapter,
            vcs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn vcs(&self) -> Option<&dyn Vcs> {
        self.vcs.as_deref()
    }

    /// Absolute path of a root-relative path
    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_listing_from_files_adds_parents() {
        let listing = Listing::from_files([PathBuf::from("b/c/d.md"), PathBuf::from("a.md")]);
        let top: Vec<_> = listing.children(Path::new("")).map(|e| e.path.clone()).collect();
        assert_eq!(top, vec![PathBuf::from("a.md"), PathBuf::from("b")]);
        let b: Vec<_> = listing.children(Path::new("b")).collect();
        assert_eq!(b.len(), 1);
        assert!(b[0].is_dir);
    }

    #[test]
    fn test_walk_prunes_ignored_directories() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "my_idea.py");
        touch(temp.path(), "build/lib/my_idea.py");
        touch(temp.path(), ".ipynb_checkpoints/x.ipynb");

        let listing = Listing::walk(temp.path(), IgnoreMatcher::bundled()).unwrap();
        assert_eq!(listing.children(Path::new("build")).count(), 0);
        assert_eq!(listing.children(Path::new("")).count(), 3);
    }

    struct Tracked(PathBuf, Vec<PathBuf>);

    impl Vcs for Tracked {
        fn root(&self) -> &Path {
            &self.0
        }
        fn tracked_files(&self) -> Result<Vec<PathBuf>> {
            Ok(self.1.clone())
        }
        fn last_author(&self) -> Result<Option<crate::git::Author>> {
            Ok(None)
        }
        fn origin_url(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_scan_restricts_to_tracked_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "tracked.py");
        touch(temp.path(), "untracked.py");

        let vcs = Tracked(temp.path().to_path_buf(), vec![PathBuf::from("tracked.py")]);
        let repo = Repository::scan(temp.path(), Some(Box::new(vcs)), &Settings::default())
            .unwrap();
        assert_eq!(repo.chapter().modules, vec![PathBuf::from("tracked.py")]);
        assert!(repo.vcs().is_some());
    }

    #[test]
    fn test_scan_without_vcs_walks() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "readme.md");
        touch(temp.path(), "b/c.md");

        let repo = Repository::scan(temp.path(), None, &Settings::default()).unwrap();
        assert_eq!(repo.chapter().index, Some(PathBuf::from("readme.md")));
        assert_eq!(repo.chapter().chapters[0].modules, vec![PathBuf::from("b/c.md")]);
    }
}
