//! CLI command implementations
//!
//! Each command lives in its own submodule with an options struct and an
//! `execute_*` entry point called from `main.rs`.

pub mod configure;
pub mod env;
pub mod list;
pub mod run;
pub mod verbs;

pub use configure::{execute_configure, ConfigureOptions};
pub use env::execute_env;
pub use list::execute_list;
pub use run::{execute_run, print_report, RunOptions};
pub use verbs::{execute_verbs, VerbOptions};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input};

use crate::chapter::Repository;
use crate::config::Settings;
use crate::error::QpubError;
use crate::metadata::MetadataExtractor;
use crate::shell::{self, Shell};

/// A project root with its resolved settings
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub settings: Settings,
    /// `major.minor` of the interpreter on the path, when one was found
    pub python_version: Option<String>,
}

impl Workspace {
    /// Resolve settings for `root` and probe the interpreter
    pub fn load(root: &Path, shell: &dyn Shell) -> Result<Self> {
        let settings = Settings::resolve(root)
            .with_context(|| format!("Failed to resolve settings for {}", root.display()))?;
        Ok(Self::new(root, settings).with_python_version(shell::python_version(shell)))
    }

    pub fn new(root: &Path, settings: Settings) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            python_version: None,
        }
    }

    pub fn with_python_version(mut self, version: Option<String>) -> Self {
        self.python_version = version;
        self
    }

    /// Scan the project
    pub fn repository(&self) -> Result<Repository> {
        Repository::open(&self.root, &self.settings)
            .with_context(|| format!("Failed to scan {}", self.root.display()))
    }

    /// Ask for a distribution name when none can be inferred
    ///
    /// Only prompts when the settings are interactive; otherwise the
    /// inference error surfaces from whichever task needs the name.
    pub fn ensure_name(&mut self, repo: &Repository) -> Result<()> {
        if !self.settings.interactive {
            return Ok(());
        }
        match MetadataExtractor::new(repo, &self.settings).name() {
            Err(QpubError::UnknownName(dir)) => {
                println!(
                    "{} No package name could be inferred from {}",
                    style("→").cyan(),
                    dir.display()
                );
                let name: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Distribution name")
                    .interact_text()?;
                self.settings.metadata.name = Some(name);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
