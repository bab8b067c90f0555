//! Version control adaptor
//!
//! The scanner and the metadata extractor only need three facts from version
//! control: which files are tracked, who made the latest commit, and where
//! the origin remote lives. [`Vcs`] is that narrow interface; [`GitRepository`]
//! implements it with git2, without spawning `git`.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository};

use crate::error::Result;

/// Commit author metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// What the engine asks of version control
pub trait Vcs {
    /// Project root the adaptor answers for
    fn root(&self) -> &Path;

    /// Tracked files, plus submodule contents, relative to [`root`](Self::root)
    fn tracked_files(&self) -> Result<Vec<PathBuf>>;

    /// Author of the most recent commit, if any commit exists
    fn last_author(&self) -> Result<Option<Author>>;

    /// URL of the `origin` remote with any trailing `.git` removed
    fn origin_url(&self) -> Result<Option<String>>;
}

/// Git repository opened with git2
pub struct GitRepository {
    repo: Repository,
    root: PathBuf,
    /// `root` relative to the work tree, empty when they coincide
    prefix: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl GitRepository {
    /// Open the repository containing `root`
    pub fn discover<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let repo = Repository::discover(root)?;
        let root = root.canonicalize()?;
        let prefix = match repo.workdir() {
            Some(workdir) => {
                let workdir = workdir.canonicalize()?;
                root.strip_prefix(&workdir)
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            }
            None => PathBuf::new(),
        };
        Ok(Self { repo, root, prefix })
    }

    fn index_paths(repo: &Repository) -> Result<Vec<(PathBuf, bool)>> {
        let index = repo.index()?;
        Ok(index
            .iter()
            .map(|entry| {
                let path = PathBuf::from(String::from_utf8_lossy(&entry.path).to_string());
                // gitlinks mark submodules
                let is_submodule = entry.mode == 0o160000;
                (path, is_submodule)
            })
            .collect())
    }
}

impl Vcs for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for (path, is_submodule) in Self::index_paths(&self.repo)? {
            if !is_submodule {
                files.push(path);
            }
        }

        for submodule in self.repo.submodules()? {
            let base = submodule.path().to_path_buf();
            match submodule.open() {
                Ok(sub) => {
                    for (path, is_submodule) in Self::index_paths(&sub)? {
                        if !is_submodule {
                            files.push(base.join(path));
                        }
                    }
                }
                Err(e) => tracing::debug!("submodule {} not checked out: {}", base.display(), e),
            }
        }

        let prefix = self.prefix.clone();
        let mut files: Vec<PathBuf> = files
            .into_iter()
            .filter_map(|p| p.strip_prefix(&prefix).ok().map(Path::to_path_buf))
            .filter(|p| self.root.join(p).exists())
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn last_author(&self) -> Result<Option<Author>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        let commit = head.peel_to_commit()?;
        let author = commit.author();
        Ok(Some(Author {
            name: author.name().unwrap_or_default().to_string(),
            email: author.email().unwrap_or_default().to_string(),
        }))
    }

    fn origin_url(&self) -> Result<Option<String>> {
        let remote = match self.repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(remote.url().map(strip_git_suffix))
    }
}

/// Drop a trailing `.git` from a remote URL
pub fn strip_git_suffix(url: &str) -> String {
    url.strip_suffix(".git").unwrap_or(url).to_string()
}
