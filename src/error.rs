//! Error types
//!
//! One variant per failure kind the engine distinguishes, plus the transport
//! errors of the crates underneath it.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, QpubError>;

/// Errors raised by the inference and projection engine
#[derive(Error, Debug)]
pub enum QpubError {
    /// The file suffix has no registered loader/dumper
    #[error("no format registered for {0}")]
    UnknownFormat(PathBuf),

    /// Name inference could not settle on a unique candidate
    #[error("cannot infer a project name from {0}; set `metadata.name` in .qpub.config.json")]
    UnknownName(PathBuf),

    /// No file is eligible to be the top of the table of contents
    #[error("no index file found for the table of contents")]
    NoIndex,

    /// A backend identifier outside the recognized set
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// A template requires a field the extractor could not infer
    #[error("{artifact} requires `{field}`, which could not be inferred")]
    MissingMetadata { artifact: String, field: String },

    /// An external command returned non-zero
    #[error("`{command}` failed with exit code {code}\n{stderr}")]
    ExternalCommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The import extractor failed on a single file
    #[error("could not parse {path}: {reason}")]
    ParseIgnored { path: PathBuf, reason: String },

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml_edit::TomlError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{0}")]
    Other(String),
}

impl QpubError {
    /// Whether the error is local to a single harvested file
    pub fn is_parse_ignored(&self) -> bool {
        matches!(self, QpubError::ParseIgnored { .. })
    }
}

impl From<handlebars::RenderError> for QpubError {
    fn from(e: handlebars::RenderError) -> Self {
        QpubError::Template(e.to_string())
    }
}

impl From<handlebars::TemplateError> for QpubError {
    fn from(e: handlebars::TemplateError) -> Self {
        QpubError::Template(e.to_string())
    }
}
