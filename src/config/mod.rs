//! Configuration
//!
//! Settings are resolved from built-in defaults, the optional project file
//! `.qpub.config.json`, and `QPUB_*` environment variables, in that order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QpubError, Result};

/// Project settings file name
pub const CONFIG_FILE: &str = ".qpub.config.json";

/// Prefix shared by every environment variable
pub const ENV_PREFIX: &str = "QPUB_";

/// Build backend used for the pyproject projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Flit,
    Poetry,
    Setuptools,
}

impl Backend {
    pub fn all() -> &'static [Backend] {
        &[Backend::Flit, Backend::Poetry, Backend::Setuptools]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Flit => "flit",
            Backend::Poetry => "poetry",
            Backend::Setuptools => "setuptools",
        }
    }
}

impl FromStr for Backend {
    type Err = QpubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flit" => Ok(Backend::Flit),
            "poetry" => Ok(Backend::Poetry),
            "setuptools" => Ok(Backend::Setuptools),
            other => Err(QpubError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tool used by the install/develop tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallBackend {
    #[default]
    Pip,
    Conda,
    Flit,
    Poetry,
}

impl InstallBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallBackend::Pip => "pip",
            InstallBackend::Conda => "conda",
            InstallBackend::Flit => "flit",
            InstallBackend::Poetry => "poetry",
        }
    }
}

impl FromStr for InstallBackend {
    type Err = QpubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pip" => Ok(InstallBackend::Pip),
            "conda" | "mamba" => Ok(InstallBackend::Conda),
            "flit" => Ok(InstallBackend::Flit),
            "poetry" => Ok(InstallBackend::Poetry),
            other => Err(QpubError::UnknownBackend(other.to_string())),
        }
    }
}

/// Documentation builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocsBuilder {
    #[default]
    JupyterBook,
    Mkdocs,
    Sphinx,
    Nikola,
}

impl DocsBuilder {
    pub fn all() -> &'static [DocsBuilder] {
        &[
            DocsBuilder::JupyterBook,
            DocsBuilder::Mkdocs,
            DocsBuilder::Sphinx,
            DocsBuilder::Nikola,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocsBuilder::JupyterBook => "jupyter_book",
            DocsBuilder::Mkdocs => "mkdocs",
            DocsBuilder::Sphinx => "sphinx",
            DocsBuilder::Nikola => "nikola",
        }
    }

    /// Distribution that provides the builder
    pub fn requirement(&self) -> &'static str {
        match self {
            DocsBuilder::JupyterBook => "jupyter-book",
            DocsBuilder::Mkdocs => "mkdocs",
            DocsBuilder::Sphinx => "sphinx",
            DocsBuilder::Nikola => "nikola",
        }
    }
}

impl FromStr for DocsBuilder {
    type Err = QpubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "jupyter_book" | "jb" => Ok(DocsBuilder::JupyterBook),
            "mkdocs" => Ok(DocsBuilder::Mkdocs),
            "sphinx" => Ok(DocsBuilder::Sphinx),
            "nikola" => Ok(DocsBuilder::Nikola),
            other => Err(QpubError::Other(format!("unknown documentation builder: {}", other))),
        }
    }
}

impl fmt::Display for DocsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-supplied values for fields the extractor leaves empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifiers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
}

/// Resolved settings for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Build backend for the pyproject projection
    #[serde(default)]
    pub backend: Backend,

    /// Describe and create environments with conda
    #[serde(default)]
    pub conda: bool,

    /// Build a PDF alongside the html documentation
    #[serde(default)]
    pub pdf: bool,

    /// Rebuild documentation on change (passed to the builder)
    #[serde(default)]
    pub watch: bool,

    /// Serve documentation after building it
    #[serde(default)]
    pub serve: bool,

    /// Prompt for values that cannot be inferred
    #[serde(default)]
    pub interactive: bool,

    /// Prefer mamba over conda
    #[serde(default)]
    pub mamba: bool,

    /// Directory holding the task database and lookup cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Install everything with pip, even when conda is enabled
    #[serde(default)]
    pub pip_only: bool,

    #[serde(default)]
    pub install_backend: InstallBackend,

    #[serde(default)]
    pub docs: DocsBuilder,

    /// Run verbs inside isolated environments
    #[serde(default)]
    pub isolate: bool,

    /// Stop the runner at the first failed task
    #[serde(default)]
    pub stop_on_failure: bool,

    #[serde(default)]
    pub metadata: MetadataOverrides,

    /// Extra glob patterns hidden from the scanner
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".qpub")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            conda: false,
            pdf: false,
            watch: false,
            serve: false,
            interactive: false,
            mamba: false,
            cache_dir: default_cache_dir(),
            pip_only: false,
            install_backend: InstallBackend::default(),
            docs: DocsBuilder::default(),
            isolate: false,
            stop_on_failure: false,
            metadata: MetadataOverrides::default(),
            exclude: Vec::new(),
        }
    }
}

/// Parse an environment flag
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Load settings from a project file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to a project file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content + "\n")?;
        Ok(())
    }

    /// Resolve settings for a project root: defaults, project file, environment
    pub fn resolve(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let base = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        base.with_env(std::env::vars())
    }

    /// Apply `QPUB_*` variables on top of these settings
    pub fn with_env<I>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();

        let flag = |key: &str, current: bool| -> Result<bool> {
            match vars.get(&format!("{}{}", ENV_PREFIX, key)) {
                Some(v) => parse_flag(v).ok_or_else(|| {
                    QpubError::Other(format!("{}{} is not a boolean: {}", ENV_PREFIX, key, v))
                }),
                None => Ok(current),
            }
        };

        self.conda = flag("CONDA", self.conda)?;
        self.pdf = flag("PDF", self.pdf)?;
        self.watch = flag("WATCH", self.watch)?;
        self.serve = flag("SERVE", self.serve)?;
        self.interactive = flag("INTERACTIVE", self.interactive)?;
        self.mamba = flag("MAMBA", self.mamba)?;
        self.pip_only = flag("PIP", self.pip_only)?;
        self.isolate = flag("ISOLATE", self.isolate)?;
        self.stop_on_failure = flag("STOP", self.stop_on_failure)?;

        if let Some(v) = vars.get("QPUB_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = vars.get("QPUB_INSTALL_BACKEND") {
            self.install_backend = v.parse()?;
        }
        if let Some(v) = vars.get("QPUB_DOCS") {
            self.docs = v.parse()?;
        }
        if let Some(v) = vars.get("QPUB_CACHE") {
            if !v.is_empty() {
                self.cache_dir = PathBuf::from(v);
            }
        }

        Ok(self)
    }

    /// Emit the current values as environment variables for sub-processes
    pub fn dump(&self) -> Vec<(String, String)> {
        let b = |v: bool| if v { "1".to_string() } else { "0".to_string() };
        vec![
            ("QPUB_BACKEND".to_string(), self.backend.to_string()),
            ("QPUB_CONDA".to_string(), b(self.conda)),
            ("QPUB_PDF".to_string(), b(self.pdf)),
            ("QPUB_WATCH".to_string(), b(self.watch)),
            ("QPUB_SERVE".to_string(), b(self.serve)),
            ("QPUB_INTERACTIVE".to_string(), b(self.interactive)),
            ("QPUB_MAMBA".to_string(), b(self.mamba)),
            (
                "QPUB_CACHE".to_string(),
                self.cache_dir.to_string_lossy().to_string(),
            ),
            ("QPUB_PIP".to_string(), b(self.pip_only)),
            (
                "QPUB_INSTALL_BACKEND".to_string(),
                self.install_backend.as_str().to_string(),
            ),
            ("QPUB_DOCS".to_string(), self.docs.to_string()),
            ("QPUB_ISOLATE".to_string(), b(self.isolate)),
            ("QPUB_STOP".to_string(), b(self.stop_on_failure)),
        ]
    }

    /// Executable used for conda-style environments
    pub fn conda_exe(&self) -> &'static str {
        if self.mamba {
            "mamba"
        } else {
            "conda"
        }
    }

    /// Task database location
    pub fn task_db_path(&self, root: &Path) -> PathBuf {
        self.cache_root(root).join("tasks.json")
    }

    /// Cache directory resolved against the project root
    pub fn cache_root(&self, root: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            root.join(&self.cache_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.backend, Backend::Flit);
        assert_eq!(settings.docs, DocsBuilder::JupyterBook);
        assert_eq!(settings.cache_dir, PathBuf::from(".qpub"));
        assert!(!settings.conda);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::default()
            .with_env(env(&[
                ("QPUB_BACKEND", "setuptools"),
                ("QPUB_CONDA", "yes"),
                ("QPUB_MAMBA", "1"),
                ("QPUB_CACHE", "/tmp/cache"),
                ("UNRELATED", "x"),
            ]))
            .unwrap();

        assert_eq!(settings.backend, Backend::Setuptools);
        assert!(settings.conda);
        assert_eq!(settings.conda_exe(), "mamba");
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_unknown_backend_in_env() {
        let err = Settings::default()
            .with_env(env(&[("QPUB_BACKEND", "hatch")]))
            .unwrap_err();
        assert!(matches!(err, QpubError::UnknownBackend(b) if b == "hatch"));
    }

    #[test]
    fn test_bad_flag_rejected() {
        assert!(Settings::default()
            .with_env(env(&[("QPUB_SERVE", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_dump_round_trips_through_env() {
        let mut settings = Settings::default();
        settings.backend = Backend::Poetry;
        settings.serve = true;
        settings.docs = DocsBuilder::Mkdocs;

        let restored = Settings::default().with_env(settings.dump()).unwrap();
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        let mut settings = Settings::default();
        settings.metadata.license = Some("BSD-3-Clause".to_string());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.metadata.license.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"backend": "poetry"}"#).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.backend, Backend::Poetry);
        assert_eq!(loaded.cache_dir, PathBuf::from(".qpub"));
    }
}
