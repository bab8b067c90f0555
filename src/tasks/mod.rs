//! Task graph
//!
//! A [`Task`] names the files it reads (`file_dep`), the files it writes
//! (`targets`), the tasks that must run before it (`task_dep`) and the
//! actions that produce its targets. The [`Runner`] decides staleness from
//! the [`TaskDb`] and executes stale tasks in dependency order.

pub mod catalog;
pub mod db;
pub mod runner;

pub use catalog::{Catalog, TaskParams, UmlFormat};
pub use db::{config_digest, file_digest, TaskDb, TaskRecord};
pub use runner::{Report, Runner, TaskState};

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::project::Artifact;
use crate::shell::CommandSpec;

/// One unit of work inside a task
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Render and write a configuration artifact
    Project(Artifact),
    /// Run an external command; a failure fails the task only when `raises`
    Command { spec: CommandSpec, raises: bool },
}

impl Action {
    pub fn command(spec: CommandSpec) -> Self {
        Action::Command { spec, raises: true }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Project(artifact) => write!(f, "project {}", artifact),
            Action::Command { spec, .. } => write!(f, "{}", spec.line()),
        }
    }
}

/// Extra condition for skipping a task whose file deps are unchanged
#[derive(Debug, Clone, PartialEq)]
pub enum Uptodate {
    /// Up to date while the digest of the value matches the recorded one
    Config(Value),
    Bool(bool),
}

/// A declared task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    pub name: String,
    pub doc: String,
    /// Root-relative files the task reads
    pub file_dep: Vec<PathBuf>,
    /// Root-relative files the task writes
    pub targets: Vec<PathBuf>,
    pub actions: Vec<Action>,
    pub task_dep: Vec<String>,
    pub uptodate: Vec<Uptodate>,
}

impl Task {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, doc: D) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
            ..Default::default()
        }
    }

    pub fn file_dep<I: IntoIterator<Item = PathBuf>>(mut self, files: I) -> Self {
        for file in files {
            if !self.file_dep.contains(&file) {
                self.file_dep.push(file);
            }
        }
        self
    }

    pub fn targets<I: IntoIterator<Item = PathBuf>>(mut self, files: I) -> Self {
        self.targets.extend(files);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn task_dep<S: Into<String>>(mut self, name: S) -> Self {
        self.task_dep.push(name.into());
        self
    }

    pub fn uptodate(mut self, check: Uptodate) -> Self {
        self.uptodate.push(check);
        self
    }

    /// Config values recorded for the task
    pub fn config_values(&self) -> Vec<&Value> {
        self.uptodate
            .iter()
            .filter_map(|u| match u {
                Uptodate::Config(v) => Some(v),
                Uptodate::Bool(_) => None,
            })
            .collect()
    }
}
