//! Configuration projections
//!
//! A [`Projector`] renders one [`Artifact`] at a time from the repository's
//! metadata. Rendering computes the final text of every target file, merged
//! with what is on disk where the artifact is merged; writing stores only the
//! files whose text changed.
//!
//! | Artifact | Targets | Mode |
//! |---|---|---|
//! | requirements | `requirements.txt`, `requirements-test.txt`, `requirements-docs.txt` | replaced |
//! | environment | `environment.yaml` | merged, `dependencies` replaced |
//! | pyproject | `pyproject.toml` | merged, `build-system` replaced |
//! | setup.cfg | `setup.cfg` | merged |
//! | setup.py | `setup.py` | created once |
//! | toc | `docs/_toc.yml` | replaced |
//! | jb config, mkdocs | `docs/_config.yml`, `mkdocs.yml` | merged |
//! | precommit | `.pre-commit-config.yaml` | keyed by repository URL |
//! | gitignore | `.gitignore` | merged lines |

pub mod environment;
pub mod precommit;
pub mod template;
pub mod toc;

pub use environment::{split_requirements, CondaSplit};
pub use template::{Engine, Template};
pub use toc::{table_of_contents, TocEntry};

use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::chapter::{self, Repository};
use crate::config::{Backend, Settings};
use crate::conventions::{self, Convention};
use crate::error::{QpubError, Result};
use crate::files::{write_atomic, Content, File};
use crate::metadata::{Metadata, MetadataExtractor};
use crate::names::LookupCache;
use crate::shell::Shell;

/// A generated configuration artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Requirements,
    Environment,
    Pyproject(Backend),
    SetupCfg,
    SetupPy,
    Toc,
    JbConfig,
    Mkdocs,
    Precommit,
    Gitignore,
}

impl Artifact {
    /// Files the artifact writes
    pub fn targets(&self) -> Vec<&'static Convention> {
        match self {
            Artifact::Requirements => vec![
                &conventions::REQUIREMENTS,
                &conventions::REQUIREMENTS_TEST,
                &conventions::REQUIREMENTS_DOCS,
            ],
            Artifact::Environment => vec![&conventions::ENVIRONMENT],
            Artifact::Pyproject(_) => vec![&conventions::PYPROJECT],
            Artifact::SetupCfg => vec![&conventions::SETUP_CFG],
            Artifact::SetupPy => vec![&conventions::SETUP_PY],
            Artifact::Toc => vec![&conventions::TOC],
            Artifact::JbConfig => vec![&conventions::JB_CONFIG],
            Artifact::Mkdocs => vec![&conventions::MKDOCS],
            Artifact::Precommit => vec![&conventions::PRECOMMIT],
            Artifact::Gitignore => vec![&conventions::GITIGNORE],
        }
    }

    /// Root-relative target paths
    pub fn target_paths(&self) -> Vec<PathBuf> {
        self.targets()
            .into_iter()
            .map(|c| c.relative().to_path_buf())
            .collect()
    }

    fn template_name(&self) -> Option<&'static str> {
        Some(match self {
            Artifact::Environment => "environment",
            Artifact::Pyproject(Backend::Flit) => "flit",
            Artifact::Pyproject(Backend::Poetry) => "poetry",
            Artifact::Pyproject(Backend::Setuptools) => "setuptools",
            Artifact::SetupCfg => "setup_cfg",
            Artifact::SetupPy => "setup_py",
            Artifact::JbConfig => "jb_config",
            Artifact::Mkdocs => "mkdocs",
            Artifact::Precommit => "precommit",
            Artifact::Requirements | Artifact::Toc | Artifact::Gitignore => return None,
        })
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Pyproject(backend) => write!(f, "pyproject ({})", backend),
            other => {
                let name = match other {
                    Artifact::Requirements => "requirements",
                    Artifact::Environment => "environment",
                    Artifact::SetupCfg => "setup.cfg",
                    Artifact::SetupPy => "setup.py",
                    Artifact::Toc => "toc",
                    Artifact::JbConfig => "config",
                    Artifact::Mkdocs => "mkdocs_yml",
                    Artifact::Precommit => "precommit",
                    _ => "gitignore",
                };
                write!(f, "{}", name)
            }
        }
    }
}

/// The text a target file should have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Root-relative path
    pub path: PathBuf,
    pub text: String,
    /// Text on disk, if the file exists
    pub current: Option<String>,
}

impl Rendered {
    pub fn changed(&self) -> bool {
        self.current.as_deref() != Some(self.text.as_str())
    }

    /// Unified diff from the file on disk to the rendered text
    pub fn diff(&self) -> String {
        let old = self.current.as_deref().unwrap_or("");
        let path = self.path.to_string_lossy();
        similar::TextDiff::from_lines(old, self.text.as_str())
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", path), &format!("b/{}", path))
            .to_string()
    }
}

/// Whether a module path names a single-file module
fn single_module(module_path: &str) -> bool {
    let path = Path::new(module_path);
    !module_path.is_empty()
        && matches!(chapter::suffix(path).as_str(), "py" | "ipynb")
        && path.file_name().is_some_and(|n| n != "__init__.py")
}

fn lines(items: &[String]) -> Content {
    Content::Lines(items.to_vec())
}

/// Renders and writes artifacts for one repository
pub struct Projector<'a> {
    repo: &'a Repository,
    settings: &'a Settings,
    shell: &'a dyn Shell,
    engine: Engine,
    python_version: Option<String>,
    metadata: OnceCell<Metadata>,
}

impl<'a> Projector<'a> {
    pub fn new(repo: &'a Repository, settings: &'a Settings, shell: &'a dyn Shell) -> Self {
        Self {
            repo,
            settings,
            shell,
            engine: Engine::new(),
            python_version: None,
            metadata: OnceCell::new(),
        }
    }

    /// Interpreter version reported to the extractor
    pub fn with_python_version(mut self, version: Option<String>) -> Self {
        self.python_version = version;
        self
    }

    /// Use an already extracted record
    pub fn with_metadata(self, metadata: Metadata) -> Self {
        let _ = self.metadata.set(metadata);
        self
    }

    pub fn repo(&self) -> &Repository {
        self.repo
    }

    /// Metadata, extracted on first use
    pub fn metadata(&self) -> Result<&Metadata> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(metadata);
        }
        let extracted = MetadataExtractor::new(self.repo, self.settings)
            .with_python_version(self.python_version.clone())
            .extract()?;
        Ok(self.metadata.get_or_init(|| extracted))
    }

    fn context(&self) -> Result<Value> {
        let metadata = self.metadata()?;
        let mut context = metadata.context()?;
        if let Some(map) = context.as_object_mut() {
            let index_type = metadata.long_description_content_type.as_str();
            map.insert(
                "description_file".to_string(),
                json!(matches!(index_type, "text/markdown" | "text/x-rst")),
            );
            map.insert(
                "single_module".to_string(),
                json!(single_module(&metadata.module_path)),
            );
        }
        Ok(context)
    }

    /// jupyter-book exclusions: hidden directories and the build directory
    fn exclude_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .repo
            .chapter()
            .hidden
            .iter()
            .filter(|p| self.repo.absolute(p).is_dir())
            .map(|p| format!("{}/*", p.to_string_lossy().replace('\\', "/")))
            .collect();
        patterns.push("_build/*".to_string());
        patterns.dedup();
        patterns
    }

    fn conda_split(&self, metadata: &Metadata) -> Result<CondaSplit> {
        let lookups = LookupCache::install(&self.settings.cache_root(self.repo.root()))?;
        let pairs: Vec<(String, String)> = metadata
            .requires
            .iter()
            .map(|pip| {
                let conda = lookups
                    .primary_to_alternate(std::slice::from_ref(pip))
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| pip.clone());
                (pip.clone(), conda)
            })
            .collect();
        Ok(split_requirements(self.shell, self.settings, &pairs))
    }

    fn rendered(&self, convention: &Convention, text: String) -> Result<Rendered> {
        let path = convention.under(self.repo.root());
        let current = if path.exists() {
            Some(std::fs::read_to_string(&path)?)
        } else {
            None
        };
        Ok(Rendered {
            path: convention.relative().to_path_buf(),
            text,
            current,
        })
    }

    /// Replace the file with `content`
    fn replaced(&self, convention: &Convention, content: &Content) -> Result<Rendered> {
        let file = convention.file(self.repo.root())?;
        let text = content.render(file.format())?;
        self.rendered(convention, text)
    }

    /// Merge `value` into the file, rewriting the keys in `replace`
    fn merged(&self, convention: &Convention, value: &Value, replace: &[String]) -> Result<Rendered> {
        let file: File = convention.file(self.repo.root())?;
        let mut current = file.load()?;
        let existing = current.to_json();
        for key in replace {
            // an unchanged key keeps its place in the file
            if existing.get(key) != value.get(key) {
                current.remove_key(key);
            }
        }
        current.merge(Content::from_json(file.format(), value)?)?;
        let text = current.render(file.format())?;
        self.rendered(convention, text)
    }

    fn template_render(&self, artifact: Artifact, context: &Value) -> Result<Vec<Rendered>> {
        let name = artifact
            .template_name()
            .ok_or_else(|| QpubError::Template(format!("{} has no template", artifact)))?;
        let template = Template::bundled(name)?;
        let convention = conventions::lookup(Path::new(&template.target))
            .ok_or_else(|| QpubError::Template(format!("unknown target {}", template.target)))?;

        if let Some(text) = &template.text {
            let path = convention.under(self.repo.root());
            if path.exists() {
                let current = std::fs::read_to_string(&path)?;
                return Ok(vec![self.rendered(convention, current)?]);
            }
            let text = self.engine.render_str(text, context)?;
            return Ok(vec![self.rendered(convention, text)?]);
        }

        let body = self.engine.render_template(&template, context)?;
        Ok(vec![self.merged(convention, &body, &template.replace)?])
    }

    /// Final text of every target of `artifact`
    pub fn render(&self, artifact: Artifact) -> Result<Vec<Rendered>> {
        match artifact {
            Artifact::Requirements => {
                let metadata = self.metadata()?;
                Ok(vec![
                    self.replaced(&conventions::REQUIREMENTS, &lines(&metadata.requires))?,
                    self.replaced(&conventions::REQUIREMENTS_TEST, &lines(&metadata.test_requires))?,
                    self.replaced(&conventions::REQUIREMENTS_DOCS, &lines(&metadata.docs_requires))?,
                ])
            }
            Artifact::Environment => {
                let metadata = self.metadata()?;
                let split = self.conda_split(metadata)?;
                let mut context = self.context()?;
                if let Some(map) = context.as_object_mut() {
                    map.insert("conda_requires".to_string(), json!(split.conda));
                    map.insert("pip_requires".to_string(), json!(split.pip));
                }
                self.template_render(artifact, &context)
            }
            Artifact::Toc => {
                let toc = table_of_contents(self.repo.chapter())?;
                let value = serde_json::to_value(&toc)?;
                Ok(vec![self.replaced(&conventions::TOC, &Content::Tree(value))?])
            }
            Artifact::JbConfig => {
                let mut context = self.context()?;
                if let Some(map) = context.as_object_mut() {
                    map.insert("exclude_patterns".to_string(), json!(self.exclude_patterns()));
                }
                self.template_render(artifact, &context)
            }
            Artifact::Precommit => {
                let template = Template::bundled("precommit")?;
                let repos = precommit::select_repos(&template, &self.repo.chapter().suffixes());
                let file = conventions::PRECOMMIT.file(self.repo.root())?;
                let merged = precommit::merge_config(file.load()?.to_json(), &repos);
                Ok(vec![self.replaced(&conventions::PRECOMMIT, &Content::Tree(merged))?])
            }
            Artifact::Gitignore => {
                let patterns: Vec<String> = self.repo.chapter().exclude.iter().cloned().collect();
                if patterns.is_empty() {
                    return Ok(Vec::new());
                }
                let value = json!(patterns);
                Ok(vec![self.merged(&conventions::GITIGNORE, &value, &[])?])
            }
            Artifact::Pyproject(_) | Artifact::SetupCfg | Artifact::SetupPy | Artifact::Mkdocs => {
                let context = self.context()?;
                self.template_render(artifact, &context)
            }
        }
    }

    /// Write the targets whose text changed; returns the written paths
    pub fn write(&self, artifact: Artifact) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for rendered in self.render(artifact)? {
            if !rendered.changed() {
                tracing::debug!("{} unchanged", rendered.path.display());
                continue;
            }
            write_atomic(&self.repo.absolute(&rendered.path), &rendered.text)?;
            tracing::info!("wrote {}", rendered.path.display());
            written.push(rendered.path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::RecordingShell;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const MY_IDEA: &str = "'''doc'''\n__version__ = \"0.0.1\"\nimport pandas\n";

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (name, text) in files {
            let path = temp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }
        temp
    }

    fn read(temp: &TempDir, name: &str) -> String {
        std::fs::read_to_string(temp.path().join(name)).unwrap()
    }

    #[test]
    fn test_requirements_files() {
        let temp = project(&[("my_idea.py", MY_IDEA)]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);

        let written = projector.write(Artifact::Requirements).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(read(&temp, "requirements.txt"), "pandas\n");
        assert_eq!(read(&temp, "requirements-test.txt"), "pytest\npytest-sugar\n");
        assert_eq!(read(&temp, "requirements-docs.txt"), "jupyter-book\n");
        assert!(projector.write(Artifact::Requirements).unwrap().is_empty());
    }

    #[test]
    fn test_flit_pyproject_is_stable() {
        let temp = project(&[("my_idea.py", MY_IDEA), ("readme.md", "# my idea\n")]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);

        projector.write(Artifact::Pyproject(Backend::Flit)).unwrap();
        let text = read(&temp, "pyproject.toml");
        assert!(text.contains("module = \"my_idea\""));
        assert!(text.contains("description-file = \"readme.md\""));
        assert!(text.contains("flit_core.buildapi"));

        let again = projector.render(Artifact::Pyproject(Backend::Flit)).unwrap();
        assert!(!again[0].changed());
    }

    #[test]
    fn test_switching_backend_replaces_build_system() {
        let temp = project(&[("my_idea.py", MY_IDEA)]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);

        projector.write(Artifact::Pyproject(Backend::Flit)).unwrap();
        projector.write(Artifact::Pyproject(Backend::Poetry)).unwrap();
        let text = read(&temp, "pyproject.toml");
        assert!(text.contains("poetry.core.masonry.api"));
        assert!(!text.contains("flit_core"));
        assert!(text.contains("pandas = \"*\""));
    }

    #[test]
    fn test_setup_py_created_once() {
        let temp = project(&[("my_idea.py", MY_IDEA), ("setup.py", "# mine\n")]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);
        assert!(projector.write(Artifact::SetupPy).unwrap().is_empty());
        assert_eq!(read(&temp, "setup.py"), "# mine\n");
    }

    #[test]
    fn test_toc_and_gitignore_without_name() {
        let temp = project(&[
            ("readme.md", "# hi\n"),
            ("a.md", ""),
            ("b.md", ""),
            ("build/x.py", ""),
        ]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);

        projector.write(Artifact::Toc).unwrap();
        assert_eq!(
            read(&temp, "docs/_toc.yml"),
            "file: readme\nsections:\n- file: a\n- file: b\n"
        );
        projector.write(Artifact::Gitignore).unwrap();
        assert!(read(&temp, ".gitignore").lines().any(|l| l == "build/"));
        assert!(matches!(
            projector.render(Artifact::Pyproject(Backend::Flit)),
            Err(QpubError::UnknownName(_))
        ));
    }

    #[test]
    fn test_environment_without_solver() {
        let temp = project(&[("my_idea.py", MY_IDEA)]);
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell).with_python_version(Some("3.11".into()));

        projector.write(Artifact::Environment).unwrap();
        let text = read(&temp, "environment.yaml");
        assert!(text.contains("- python>=3.11"));
        assert!(text.contains("- pandas"));
        assert!(!text.contains("pip:"));
    }

    #[test]
    fn test_diff_of_new_file() {
        let rendered = Rendered {
            path: PathBuf::from("requirements.txt"),
            text: "pandas\n".to_string(),
            current: None,
        };
        assert!(rendered.changed());
        let diff = rendered.diff();
        assert!(diff.contains("+++ b/requirements.txt"));
        assert!(diff.contains("+pandas"));
    }
}
