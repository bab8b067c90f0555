//! Sessions
//!
//! A [`Verb`] names a user-level goal and expands to catalog tasks. Chained
//! verbs compose into one plan ordered by the catalog, so `test configure`
//! still configures first. A verb may run isolated: the session prepares a
//! private environment under the cache directory, installs what the verb's
//! tools need, and re-invokes `qpub run` inside it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{Backend, DocsBuilder, InstallBackend, Settings};
use crate::conventions;
use crate::error::{QpubError, Result};
use crate::shell::{CommandSpec, Shell};
use crate::tasks::{Catalog, TaskParams, UmlFormat};

/// A user-level goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    Configure,
    Build,
    Install,
    Develop,
    Lint,
    Test,
    Docs,
}

impl Verb {
    pub fn all() -> &'static [Verb] {
        &[
            Verb::Configure,
            Verb::Build,
            Verb::Install,
            Verb::Develop,
            Verb::Lint,
            Verb::Test,
            Verb::Docs,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Configure => "configure",
            Verb::Build => "build",
            Verb::Install => "install",
            Verb::Develop => "develop",
            Verb::Lint => "lint",
            Verb::Test => "test",
            Verb::Docs => "docs",
        }
    }

    /// Verbs selected by a global `--actions` group
    pub fn group(name: &str) -> Result<Vec<Verb>> {
        Ok(match name.trim().to_lowercase().as_str() {
            "configure" => vec![Verb::Configure],
            "docs" => vec![Verb::Configure, Verb::Docs],
            "test" => vec![Verb::Configure, Verb::Test],
            "install" => vec![Verb::Configure, Verb::Install],
            "all" => vec![
                Verb::Configure,
                Verb::Install,
                Verb::Lint,
                Verb::Test,
                Verb::Docs,
            ],
            other => return Err(QpubError::Other(format!("unknown action group: {}", other))),
        })
    }

    /// Catalog tasks the verb asks for; undeclared ones are left out
    pub fn tasks(&self, catalog: &Catalog, settings: &Settings) -> Vec<String> {
        let wanted: Vec<String> = match self {
            Verb::Configure => {
                let mut names = vec!["requirements"];
                if settings.conda {
                    names.push("environment");
                }
                names.extend([
                    "pyproject",
                    "setup.cfg",
                    "setup.py",
                    "jupytext",
                    "toc",
                    "config",
                    "mkdocs_yml",
                    "precommit",
                    "gitignore",
                ]);
                names.into_iter().map(str::to_string).collect()
            }
            Verb::Build => vec!["build".to_string()],
            Verb::Install => vec!["install".to_string()],
            Verb::Develop => vec!["develop".to_string()],
            Verb::Lint => vec!["lint".to_string()],
            Verb::Test => vec!["test".to_string()],
            Verb::Docs => vec![format!("docs:{}", settings.docs.as_str())],
        };
        wanted.into_iter().filter(|t| catalog.contains(t)).collect()
    }
}

impl FromStr for Verb {
    type Err = QpubError;

    fn from_str(s: &str) -> Result<Self> {
        Verb::all()
            .iter()
            .find(|v| v.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| QpubError::UnknownTask(s.to_string()))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tasks for a chain of verbs, in catalog order without repeats
pub fn compose(verbs: &[Verb], catalog: &Catalog, settings: &Settings) -> Vec<String> {
    let wanted: Vec<String> = verbs
        .iter()
        .flat_map(|v| v.tasks(catalog, settings))
        .collect();
    catalog
        .names()
        .into_iter()
        .filter(|name| wanted.iter().any(|w| w == name))
        .map(str::to_string)
        .collect()
}

/// Leading verbs of a chain and the arguments after them
pub fn split_chain(args: &[String]) -> (Vec<Verb>, Vec<String>) {
    let verbs: Vec<Verb> = args.iter().map_while(|a| a.parse().ok()).collect();
    let rest = args[verbs.len()..].to_vec();
    (verbs, rest)
}

/// Command-line form of task parameters, for a re-invoked `qpub run`
pub fn forward_args(params: &TaskParams) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(backend) = params.backend {
        args.push(format!("--backend={}", backend));
    }
    for (flag, on) in [
        ("raises", params.lint_raises),
        ("monkeytype", params.monkeytype),
        ("pip", params.pip),
        ("develop", params.develop),
        ("minimal", params.uml_minimal),
    ] {
        if on {
            args.push(format!("--{}=true", flag));
        }
    }
    if let Some(serve) = params.serve {
        args.push(format!("--serve={}", serve));
    }
    if params.uml_format != UmlFormat::default() {
        args.push(format!("--format={}", params.uml_format));
    }
    if !params.test_args.is_empty() {
        args.push("--".to_string());
        args.extend(params.test_args.iter().cloned());
    }
    args
}

/// Something an isolated environment must have installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Package(String),
    /// A root-relative requirements file
    File(PathBuf),
}

/// External dependencies of a verb's tools
pub fn requirements(verb: Verb, settings: &Settings, params: &TaskParams) -> Vec<Requirement> {
    let package = |name: &str| Requirement::Package(name.to_string());
    let file = |c: &conventions::Convention| Requirement::File(c.relative().to_path_buf());
    let backend = params.backend.unwrap_or(settings.backend);
    match verb {
        Verb::Configure => vec![package("jupytext")],
        Verb::Build => vec![match backend {
            Backend::Flit => package("flit"),
            Backend::Poetry => package("poetry"),
            Backend::Setuptools => package("pep517"),
        }],
        Verb::Install | Verb::Develop => match settings.install_backend {
            InstallBackend::Flit => vec![package("flit")],
            InstallBackend::Poetry => vec![package("poetry")],
            InstallBackend::Pip | InstallBackend::Conda => Vec::new(),
        },
        Verb::Lint => vec![package("pre-commit")],
        Verb::Test => {
            let mut reqs = vec![file(&conventions::REQUIREMENTS), file(&conventions::REQUIREMENTS_TEST)];
            if params.monkeytype {
                reqs.push(package("monkeytype"));
            }
            reqs
        }
        Verb::Docs => {
            let mut reqs = vec![file(&conventions::REQUIREMENTS_DOCS)];
            reqs.push(package(settings.docs.requirement()));
            if settings.docs == DocsBuilder::Sphinx && (settings.watch || params.serve.unwrap_or(settings.serve)) {
                reqs.push(package("sphinx-autobuild"));
            }
            reqs
        }
    }
}

/// A private environment for one verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedEnv {
    pub verb: Verb,
    /// Absolute environment prefix
    pub prefix: PathBuf,
    pub conda: bool,
}

impl IsolatedEnv {
    pub fn new(root: &Path, settings: &Settings, verb: Verb) -> Self {
        Self {
            verb,
            prefix: settings.cache_root(root).join("envs").join(verb.as_str()),
            conda: settings.conda,
        }
    }

    /// Directory holding the environment's executables
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.prefix.join("Scripts")
        } else {
            self.prefix.join("bin")
        }
    }

    pub fn python(&self) -> PathBuf {
        self.bin_dir().join("python")
    }

    /// Variables that activate the environment for a child process
    pub fn activation(&self) -> Vec<(String, String)> {
        let mut path = std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default())
            .collect::<Vec<_>>();
        path.insert(0, self.bin_dir());
        let joined = std::env::join_paths(path)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| self.bin_dir().to_string_lossy().to_string());
        let prefix_var = if self.conda { "CONDA_PREFIX" } else { "VIRTUAL_ENV" };
        vec![
            ("PATH".to_string(), joined),
            (prefix_var.to_string(), self.prefix.to_string_lossy().to_string()),
        ]
    }
}

/// Prepares isolated environments and runs verbs inside them
pub struct Session<'a> {
    root: PathBuf,
    settings: &'a Settings,
    shell: &'a dyn Shell,
}

impl<'a> Session<'a> {
    pub fn new(root: &Path, settings: &'a Settings, shell: &'a dyn Shell) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            shell,
        }
    }

    /// Create the environment when missing and install the verb's tools
    pub fn prepare(&self, verb: Verb, params: &TaskParams) -> Result<IsolatedEnv> {
        let env = IsolatedEnv::new(&self.root, self.settings, verb);
        let prefix = env.prefix.to_string_lossy().to_string();

        if !env.prefix.exists() {
            tracing::info!("creating {} environment at {}", verb, prefix);
            let create = if env.conda {
                CommandSpec::new(self.settings.conda_exe())
                    .args(["create", "-y", "-c", "conda-forge", "-p"])
                    .arg(prefix.clone())
                    .arg("python")
            } else {
                let python = ["python3", "python"]
                    .into_iter()
                    .find(|p| self.shell.which(p).is_some())
                    .unwrap_or("python3");
                CommandSpec::new(python).args(["-m", "venv"]).arg(prefix.clone())
            };
            self.shell.check(&create.cwd(&self.root))?;
        }

        let mut install = CommandSpec::new(env.python().to_string_lossy().to_string())
            .args(["-m", "pip", "install"]);
        let mut any = false;
        for requirement in requirements(verb, self.settings, params) {
            match requirement {
                Requirement::Package(name) => {
                    install = install.arg(name);
                    any = true;
                }
                Requirement::File(path) if self.root.join(&path).exists() => {
                    install = install.arg("-r").arg(path.to_string_lossy().to_string());
                    any = true;
                }
                Requirement::File(path) => {
                    tracing::debug!("{} not written yet; skipping", path.display());
                }
            }
        }
        if any {
            self.shell.check(&install.cwd(&self.root))?;
        }
        Ok(env)
    }

    /// `qpub run <tasks> <args>` inside the environment, returning its exit code
    pub fn run_isolated(&self, env: &IsolatedEnv, program: &Path, tasks: &[String], args: &[String]) -> Result<i32> {
        let mut vars = self.settings.dump();
        vars.retain(|(k, _)| k != "QPUB_ISOLATE");
        vars.push(("QPUB_ISOLATE".to_string(), "0".to_string()));
        vars.extend(env.activation());

        let spec = CommandSpec::new(program.to_string_lossy().to_string())
            .arg("run")
            .args(tasks.iter().cloned())
            .args(args.iter().cloned())
            .envs(vars)
            .cwd(&self.root);
        let output = self.shell.run(&spec)?;
        Ok(output.code)
    }
}
