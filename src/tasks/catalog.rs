//! Task catalog
//!
//! Declares the tasks available for a repository. Declaration order is the
//! recommended execution order: projections first, then builds, installs,
//! lint, tests and documentation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::json;

use super::{Action, Task, Uptodate};
use crate::chapter::{self, Repository, DISPLAY_SUFFIXES};
use crate::config::{Backend, DocsBuilder, InstallBackend, Settings};
use crate::conventions::{self, Convention};
use crate::error::{QpubError, Result};
use crate::metadata::MetadataExtractor;
use crate::project::Artifact;
use crate::shell::CommandSpec;

/// Output format of the `uml` task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UmlFormat {
    #[default]
    Png,
    Svg,
    Dot,
}

impl UmlFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            UmlFormat::Png => "png",
            UmlFormat::Svg => "svg",
            UmlFormat::Dot => "dot",
        }
    }
}

impl FromStr for UmlFormat {
    type Err = QpubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(UmlFormat::Png),
            "svg" => Ok(UmlFormat::Svg),
            "dot" => Ok(UmlFormat::Dot),
            other => Err(QpubError::Other(format!("unknown uml format: {}", other))),
        }
    }
}

impl fmt::Display for UmlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-task parameters from the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskParams {
    /// `pyproject --backend`; the settings backend when unset
    pub backend: Option<Backend>,
    /// `lint --raises`
    pub lint_raises: bool,
    /// `test --monkeytype`
    pub monkeytype: bool,
    /// Arguments forwarded to the test runner
    pub test_args: Vec<String>,
    /// `install --pip`
    pub pip: bool,
    /// `install --develop`
    pub develop: bool,
    /// `docs:<builder> --serve`; the settings flag when unset
    pub serve: Option<bool>,
    pub uml_format: UmlFormat,
    pub uml_minimal: bool,
}

/// Tasks declared for one repository
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tasks: Vec<Task>,
}

fn rel(convention: &Convention) -> PathBuf {
    convention.relative().to_path_buf()
}

fn existing(root: &Path, conventions: &[&Convention]) -> Vec<PathBuf> {
    conventions
        .iter()
        .filter(|c| c.under(root).exists())
        .map(|c| rel(c))
        .collect()
}

impl Catalog {
    /// Declare every task that applies to the repository
    pub fn build(repo: &Repository, settings: &Settings, params: &TaskParams) -> Catalog {
        let root = repo.root();
        let chapter = repo.chapter();
        let content = chapter.files();
        let backend = params.backend.unwrap_or(settings.backend);
        let config_file = existing(root, &[&conventions::QPUB_CONFIG]);
        let requirement_files = vec![
            rel(&conventions::REQUIREMENTS),
            rel(&conventions::REQUIREMENTS_TEST),
            rel(&conventions::REQUIREMENTS_DOCS),
        ];
        let metadata_config = json!({
            "metadata": serde_json::to_value(&settings.metadata).unwrap_or_default(),
            "docs": settings.docs.as_str(),
        });

        let mut tasks = Vec::new();

        tasks.push(
            Task::new("requirements", "write requirements files from harvested imports")
                .file_dep(content.iter().cloned())
                .file_dep(config_file.iter().cloned())
                .targets(requirement_files.iter().cloned())
                .action(Action::Project(Artifact::Requirements))
                .uptodate(Uptodate::Config(metadata_config.clone())),
        );

        tasks.push(
            Task::new("environment", "write a conda environment from the requirements")
                .file_dep([rel(&conventions::REQUIREMENTS)])
                .task_dep("requirements")
                .targets([rel(&conventions::ENVIRONMENT)])
                .action(Action::Project(Artifact::Environment))
                .uptodate(Uptodate::Config(json!({
                    "pip_only": settings.pip_only,
                    "mamba": settings.mamba,
                }))),
        );

        if backend == Backend::Setuptools {
            tasks.push(
                Task::new("setup.cfg", "write setup.cfg metadata and options")
                    .file_dep(content.iter().cloned())
                    .file_dep(requirement_files.iter().cloned())
                    .task_dep("requirements")
                    .targets([rel(&conventions::SETUP_CFG)])
                    .action(Action::Project(Artifact::SetupCfg))
                    .uptodate(Uptodate::Config(metadata_config.clone())),
            );
            tasks.push(
                Task::new("setup.py", "write a setup.py shim")
                    .targets([rel(&conventions::SETUP_PY)])
                    .action(Action::Project(Artifact::SetupPy))
                    .uptodate(Uptodate::Bool(true)),
            );
        }

        let mut pyproject = Task::new("pyproject", format!("write pyproject.toml for {}", backend))
            .file_dep(content.iter().cloned())
            .file_dep(requirement_files.iter().cloned())
            .task_dep("requirements")
            .targets([rel(&conventions::PYPROJECT)])
            .action(Action::Project(Artifact::Pyproject(backend)))
            .uptodate(Uptodate::Config(json!({
                "backend": backend.as_str(),
                "metadata": metadata_config.clone(),
            })));
        if backend == Backend::Setuptools {
            pyproject = pyproject.task_dep("setup.cfg");
        }
        tasks.push(pyproject);

        let notebooks = chapter.files_with_suffix("ipynb");
        if !notebooks.is_empty() && !chapter.has_suffix("py") {
            let paired: Vec<PathBuf> = notebooks.iter().map(|n| n.with_extension("py")).collect();
            tasks.push(
                Task::new("jupytext", "pair notebooks with percent-format python files")
                    .file_dep(notebooks.iter().cloned())
                    .targets(paired)
                    .action(Action::command(
                        CommandSpec::new("jupytext")
                            .args(["--set-formats", "ipynb,py:percent"])
                            .args(notebooks.iter().map(|n| path_arg(n)))
                            .cwd(root),
                    )),
            );
        }

        let displayable: Vec<PathBuf> = content
            .iter()
            .filter(|p| DISPLAY_SUFFIXES.contains(&chapter::suffix(p).as_str()))
            .cloned()
            .collect();
        if !displayable.is_empty() {
            tasks.push(
                Task::new("toc", "write the book table of contents")
                    .file_dep(displayable.iter().cloned())
                    .targets([rel(&conventions::TOC)])
                    .action(Action::Project(Artifact::Toc)),
            );
        }
        match settings.docs {
            DocsBuilder::JupyterBook => tasks.push(
                Task::new("config", "write the jupyter-book configuration")
                    .file_dep(content.iter().cloned())
                    .targets([rel(&conventions::JB_CONFIG)])
                    .action(Action::Project(Artifact::JbConfig)),
            ),
            DocsBuilder::Mkdocs => tasks.push(
                Task::new("mkdocs_yml", "write the mkdocs configuration")
                    .file_dep(content.iter().cloned())
                    .targets([rel(&conventions::MKDOCS)])
                    .action(Action::Project(Artifact::Mkdocs)),
            ),
            DocsBuilder::Sphinx | DocsBuilder::Nikola => {}
        }

        tasks.push(
            Task::new("precommit", "write the pre-commit hook configuration")
                .file_dep(content.iter().cloned())
                .targets([rel(&conventions::PRECOMMIT)])
                .action(Action::Project(Artifact::Precommit)),
        );
        tasks.push(
            Task::new("gitignore", "add matched ignore patterns to .gitignore")
                .file_dep(content.iter().cloned())
                .action(Action::Project(Artifact::Gitignore))
                .uptodate(Uptodate::Config(json!(chapter
                    .exclude
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()))),
        );

        let packaging = existing(
            root,
            &[&conventions::PYPROJECT, &conventions::SETUP_CFG, &conventions::SETUP_PY],
        );
        let build = match backend {
            Backend::Flit => CommandSpec::new("flit").arg("build"),
            Backend::Poetry => CommandSpec::new("poetry").arg("build"),
            Backend::Setuptools => CommandSpec::new("python").args(["-m", "pep517.build", "."]),
        };
        tasks.push(
            Task::new("build", "build a source distribution and wheel")
                .file_dep(content.iter().cloned())
                .file_dep(packaging.iter().cloned())
                .task_dep("pyproject")
                .action(Action::command(build.cwd(root))),
        );

        for (name, develop) in [("install", params.develop), ("develop", true)] {
            let doc = if develop {
                "install the package in editable mode"
            } else {
                "install the package"
            };
            let mut task = Task::new(name, doc)
                .file_dep(packaging.iter().cloned())
                .file_dep(existing(root, &[&conventions::REQUIREMENTS]))
                .task_dep("pyproject");
            for spec in install_commands(settings, params.pip, develop) {
                task = task.action(Action::command(spec.cwd(root)));
            }
            tasks.push(task);
        }

        tasks.push(
            Task::new("lint", "run pre-commit on every file")
                .file_dep(content.iter().cloned())
                .file_dep([rel(&conventions::PRECOMMIT)])
                .task_dep("precommit")
                .action(Action::Command {
                    spec: CommandSpec::new("pre-commit")
                        .args(["run", "--all-files"])
                        .cwd(root),
                    raises: params.lint_raises,
                }),
        );

        let pytest = if params.monkeytype {
            CommandSpec::new("monkeytype").args(["run", "-m", "pytest"])
        } else {
            CommandSpec::new("pytest")
        };
        tasks.push(
            Task::new("test", "run the test suite")
                .file_dep(content.iter().cloned())
                .file_dep(existing(
                    root,
                    &[&conventions::REQUIREMENTS_TEST, &conventions::PYTEST_INI, &conventions::CONFTEST],
                ))
                .action(Action::command(pytest.args(params.test_args.iter().cloned()).cwd(root))),
        );

        let serve = params.serve.unwrap_or(settings.serve);
        for builder in DocsBuilder::all() {
            tasks.push(docs_task(root, settings, *builder, serve, &content));
        }

        if let Ok(found) = MetadataExtractor::new(repo, settings).name() {
            if !found.path.as_os_str().is_empty() {
                let module = if found.path.ends_with("__init__.py") {
                    found.path.parent().map(Path::to_path_buf).unwrap_or_default()
                } else {
                    found.path.clone()
                };
                let mut spec = CommandSpec::new("pyreverse")
                    .args(["-o", params.uml_format.as_str()]);
                if params.uml_minimal {
                    spec = spec.arg("-k");
                }
                tasks.push(
                    Task::new("uml", "draw class and package diagrams")
                        .file_dep(content.iter().filter(|p| chapter::suffix(p) == "py").cloned())
                        .action(Action::command(
                            spec.args(["-p".to_string(), found.name, path_arg(&module)])
                                .cwd(root),
                        )),
                );
            }
        }

        Catalog { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Selected tasks and their dependencies, in declaration order
    pub fn plan(&self, selected: &[String]) -> Result<Vec<&Task>> {
        let mut wanted = std::collections::BTreeSet::new();
        let mut stack: Vec<String> = selected.to_vec();
        while let Some(name) = stack.pop() {
            let task = self
                .get(&name)
                .ok_or_else(|| QpubError::UnknownTask(name.clone()))?;
            if wanted.insert(name) {
                stack.extend(task.task_dep.iter().filter(|d| self.contains(d)).cloned());
            }
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| wanted.contains(&t.name))
            .collect())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Commands that install the project with the chosen tool; `pip` forces pip
fn install_commands(settings: &Settings, pip: bool, develop: bool) -> Vec<CommandSpec> {
    let requirements = path_arg(conventions::REQUIREMENTS.relative());
    let pip_install = || {
        let mut spec = CommandSpec::new("pip").arg("install");
        if develop {
            spec = spec.arg("-e");
        }
        spec.args([".", "--no-deps"])
    };

    let tool = if pip {
        InstallBackend::Pip
    } else {
        settings.install_backend
    };
    match tool {
        InstallBackend::Flit => {
            let mut spec = CommandSpec::new("flit").arg("install");
            if develop {
                spec = spec.arg("-s");
            }
            vec![spec]
        }
        InstallBackend::Poetry => vec![CommandSpec::new("poetry").arg("install")],
        InstallBackend::Conda => vec![
            CommandSpec::new(settings.conda_exe())
                .args(["install", "-y", "-c", "conda-forge", "--file"])
                .arg(requirements),
            pip_install(),
        ],
        InstallBackend::Pip => vec![
            CommandSpec::new("pip").args(["install", "-r"]).arg(requirements),
            pip_install(),
        ],
    }
}

fn docs_task(
    root: &Path,
    settings: &Settings,
    builder: DocsBuilder,
    serve: bool,
    content: &[PathBuf],
) -> Task {
    let task = Task::new(
        format!("docs:{}", builder.as_str()),
        format!("build the documentation with {}", builder.as_str()),
    )
    .file_dep(content.iter().cloned());

    let (task, spec) = match builder {
        DocsBuilder::JupyterBook => {
            let toc = path_arg(conventions::TOC.relative());
            let config = path_arg(conventions::JB_CONFIG.relative());
            let mut spec = CommandSpec::new("jb").args(["build", ".", "--toc", toc.as_str(), "--config", config.as_str()]);
            if settings.pdf {
                spec = spec.args(["--builder", "pdfhtml"]);
            }
            let task = task
                .file_dep(existing(root, &[&conventions::TOC, &conventions::JB_CONFIG]))
                .task_dep("toc")
                .task_dep("config");
            (task, spec)
        }
        DocsBuilder::Mkdocs => {
            let verb = if serve { "serve" } else { "build" };
            let task = task
                .file_dep(existing(root, &[&conventions::MKDOCS]))
                .task_dep("mkdocs_yml");
            (task, CommandSpec::new("mkdocs").arg(verb))
        }
        DocsBuilder::Sphinx => {
            let program = if serve || settings.watch {
                "sphinx-autobuild"
            } else {
                "sphinx-build"
            };
            let task = task.file_dep(existing(root, &[&conventions::SPHINX_CONF]));
            (task, CommandSpec::new(program).args(["docs", "docs/_build/html"]))
        }
        DocsBuilder::Nikola => {
            let verb = if serve || settings.watch { "auto" } else { "build" };
            let task = task.file_dep(existing(root, &[&conventions::NIKOLA_CONF]));
            (task, CommandSpec::new("nikola").arg(verb))
        }
    };
    task.action(Action::command(spec.cwd(root)))
}
