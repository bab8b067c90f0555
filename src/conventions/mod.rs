//! Convention paths
//!
//! Fixed, well-known file names with special meaning to the project: build
//! metadata, install metadata, requirements, ignore rules, documentation
//! configuration. The set is closed; [`ALL`] enumerates it and every
//! generated artifact targets one of its entries.
//!
//! Paths are relative to the repository root, so `docs/_toc.yml` is a
//! convention while `notes/_toc.yml` is content.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::files::File;

/// A well-known project path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Convention {
    /// Stable identifier used in task and log output
    pub key: &'static str,
    /// Path relative to the repository root
    pub path: &'static str,
    pub doc: &'static str,
}

impl Convention {
    const fn new(key: &'static str, path: &'static str, doc: &'static str) -> Self {
        Self { key, path, doc }
    }

    pub fn relative(&self) -> &'static Path {
        Path::new(self.path)
    }

    /// Absolute location under a repository root
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(self.path)
    }

    /// Typed file handle under a repository root
    pub fn file(&self, root: &Path) -> Result<File> {
        File::new(self.under(root))
    }

    pub fn matches(&self, relative: &Path) -> bool {
        normalize(relative) == self.path
    }
}

pub const PYPROJECT: Convention =
    Convention::new("pyproject", "pyproject.toml", "build metadata");
pub const SETUP_CFG: Convention =
    Convention::new("setup_cfg", "setup.cfg", "declarative setuptools metadata");
pub const SETUP_PY: Convention =
    Convention::new("setup_py", "setup.py", "setuptools entry point");
pub const REQUIREMENTS: Convention =
    Convention::new("requirements", "requirements.txt", "runtime requirements");
pub const REQUIREMENTS_TEST: Convention = Convention::new(
    "requirements_test",
    "requirements-test.txt",
    "test requirements",
);
pub const REQUIREMENTS_DOCS: Convention = Convention::new(
    "requirements_docs",
    "requirements-docs.txt",
    "documentation requirements",
);
pub const ENVIRONMENT: Convention =
    Convention::new("environment", "environment.yaml", "conda environment");
pub const ENVIRONMENT_YML: Convention =
    Convention::new("environment_yml", "environment.yml", "conda environment");
pub const PRECOMMIT: Convention = Convention::new(
    "precommit",
    ".pre-commit-config.yaml",
    "lint and format hooks",
);
pub const GITIGNORE: Convention = Convention::new("gitignore", ".gitignore", "ignore rules");
pub const TOC: Convention =
    Convention::new("toc", "docs/_toc.yml", "jupyter book table of contents");
pub const JB_CONFIG: Convention =
    Convention::new("jb_config", "docs/_config.yml", "jupyter book configuration");
pub const MKDOCS: Convention = Convention::new("mkdocs", "mkdocs.yml", "mkdocs configuration");
pub const SPHINX_CONF: Convention =
    Convention::new("sphinx_conf", "docs/conf.py", "sphinx configuration");
pub const NIKOLA_CONF: Convention =
    Convention::new("nikola_conf", "conf.py", "nikola site configuration");
pub const READTHEDOCS: Convention =
    Convention::new("readthedocs", ".readthedocs.yml", "read the docs build");
pub const FLAKE8: Convention = Convention::new("flake8", ".flake8", "flake8 settings");
pub const TOX: Convention = Convention::new("tox", "tox.ini", "tox environments");
pub const PYTEST_INI: Convention = Convention::new("pytest_ini", "pytest.ini", "pytest settings");
pub const CONFTEST: Convention = Convention::new("conftest", "conftest.py", "pytest fixtures");
pub const MANIFEST_IN: Convention =
    Convention::new("manifest_in", "MANIFEST.in", "sdist manifest");
pub const LICENSE: Convention = Convention::new("license", "LICENSE", "license text");
pub const POSTBUILD: Convention = Convention::new("postbuild", "postBuild", "binder post build");
pub const DODO: Convention = Convention::new("dodo", "dodo.py", "task definitions");
pub const NOXFILE: Convention = Convention::new("noxfile", "noxfile.py", "nox sessions");
pub const QPUB_CONFIG: Convention = Convention::new(
    "qpub_config",
    crate::config::CONFIG_FILE,
    "qpub settings",
);

/// Every registered convention
pub const ALL: &[Convention] = &[
    PYPROJECT,
    SETUP_CFG,
    SETUP_PY,
    REQUIREMENTS,
    REQUIREMENTS_TEST,
    REQUIREMENTS_DOCS,
    ENVIRONMENT,
    ENVIRONMENT_YML,
    PRECOMMIT,
    GITIGNORE,
    TOC,
    JB_CONFIG,
    MKDOCS,
    SPHINX_CONF,
    NIKOLA_CONF,
    READTHEDOCS,
    FLAKE8,
    TOX,
    PYTEST_INI,
    CONFTEST,
    MANIFEST_IN,
    LICENSE,
    POSTBUILD,
    DODO,
    NOXFILE,
    QPUB_CONFIG,
];

/// Directory promoted to the documentation slot of a chapter
pub const DOCS_DIR: &str = "docs";

/// Directory promoted to the source slot of a chapter
pub const SRC_DIR: &str = "src";

/// Find the convention registered for a root-relative path
pub fn lookup(relative: &Path) -> Option<&'static Convention> {
    let text = normalize(relative);
    ALL.iter().find(|c| c.path == text)
}

pub fn is_convention(relative: &Path) -> bool {
    lookup(relative).is_some()
}

fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    text.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_by_relative_path() {
        assert_eq!(lookup(Path::new("pyproject.toml")), Some(&PYPROJECT));
        assert_eq!(lookup(Path::new("./docs/_toc.yml")), Some(&TOC));
        assert_eq!(lookup(Path::new("notes/_toc.yml")), None);
        assert_eq!(lookup(Path::new("my_idea.py")), None);
    }

    #[test]
    fn test_registry_is_unique() {
        let paths: HashSet<_> = ALL.iter().map(|c| c.path).collect();
        let keys: HashSet<_> = ALL.iter().map(|c| c.key).collect();
        assert_eq!(paths.len(), ALL.len());
        assert_eq!(keys.len(), ALL.len());
    }

    #[test]
    fn test_typed_files() {
        let root = Path::new("/project");
        assert!(PYPROJECT.file(root).is_ok());
        assert!(GITIGNORE.file(root).is_ok());
        assert!(SETUP_PY.file(root).is_err());
        assert_eq!(TOC.under(root), PathBuf::from("/project/docs/_toc.yml"));
    }
}
