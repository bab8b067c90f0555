//! Task runner
//!
//! Each planned task moves through
//! `unknown → evaluating → (up-to-date | stale) → executing → (ok | failed)`.
//! A failed task does not stop its dependents unless the runner stops on the
//! first failure.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{Action, Catalog, Task, TaskDb};
use crate::error::Result;
use crate::project::Projector;
use crate::shell::Shell;

/// Where a task is in its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Unknown,
    Evaluating,
    UpToDate,
    /// Out of date, with the reason
    Stale(String),
    Executing,
    Ok,
    Failed(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::UpToDate | TaskState::Ok | TaskState::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Unknown => write!(f, "not run"),
            TaskState::Evaluating => write!(f, "evaluating"),
            TaskState::UpToDate => write!(f, "up-to-date"),
            TaskState::Stale(reason) => write!(f, "stale ({})", reason),
            TaskState::Executing => write!(f, "executing"),
            TaskState::Ok => write!(f, "ok"),
            TaskState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of a run, one state per planned task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub results: Vec<(String, TaskState)>,
}

impl Report {
    pub fn state(&self, task: &str) -> Option<&TaskState> {
        self.results
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, state)| state)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, state)| matches!(state, TaskState::Failed(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Tasks whose actions ran
    pub fn executed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, state)| matches!(state, TaskState::Ok | TaskState::Failed(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn success(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Executes planned tasks one at a time
pub struct Runner<'a> {
    root: PathBuf,
    shell: &'a dyn Shell,
    projector: &'a Projector<'a>,
    db: TaskDb,
    stop_on_failure: bool,
}

impl<'a> Runner<'a> {
    pub fn new(root: &Path, shell: &'a dyn Shell, projector: &'a Projector<'a>, db: TaskDb) -> Self {
        Self {
            root: root.to_path_buf(),
            shell,
            projector,
            db,
            stop_on_failure: false,
        }
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn db(&self) -> &TaskDb {
        &self.db
    }

    /// Up-to-date or stale, without running anything
    pub fn evaluate(&self, task: &Task) -> TaskState {
        match self.db.stale_reason(&self.root, task) {
            Some(reason) => TaskState::Stale(reason),
            None => TaskState::UpToDate,
        }
    }

    fn transition(task: &Task, state: &mut TaskState, next: TaskState) {
        tracing::debug!("{}: {} -> {}", task.name, state, next);
        *state = next;
    }

    fn execute(&self, task: &Task) -> Result<()> {
        for action in &task.actions {
            match action {
                Action::Project(artifact) => {
                    for path in self.projector.write(*artifact)? {
                        tracing::info!("{}: wrote {}", task.name, path.display());
                    }
                }
                Action::Command { spec, raises: true } => {
                    self.shell.check(spec)?;
                }
                Action::Command { spec, raises: false } => {
                    let output = self.shell.run(spec)?;
                    if !output.success() {
                        tracing::warn!("{} exited with {}", spec.line(), output.code);
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the selected tasks and their dependencies
    pub fn run(&mut self, catalog: &Catalog, selected: &[String]) -> Result<Report> {
        let plan = catalog.plan(selected)?;
        let mut report = Report {
            results: plan
                .iter()
                .map(|t| (t.name.clone(), TaskState::Unknown))
                .collect(),
        };

        for (task, (_, state)) in plan.iter().zip(report.results.iter_mut()) {
            Self::transition(task, state, TaskState::Evaluating);
            let evaluated = self.evaluate(task);
            let stale = matches!(evaluated, TaskState::Stale(_));
            Self::transition(task, state, evaluated);
            if !stale {
                tracing::info!("{} is up to date", task.name);
                continue;
            }

            Self::transition(task, state, TaskState::Executing);
            match self.execute(task) {
                Ok(()) => {
                    tracing::info!("{} ok", task.name);
                    self.db.remember(&self.root, task);
                    self.db.save()?;
                    Self::transition(task, state, TaskState::Ok);
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", task.name, e);
                    self.db.forget(&task.name);
                    self.db.save()?;
                    Self::transition(task, state, TaskState::Failed(e.to_string()));
                    if self.stop_on_failure {
                        break;
                    }
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::Repository;
    use crate::config::Settings;
    use crate::shell::{CommandSpec, Output, RecordingShell};
    use crate::tasks::TaskParams;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("my_idea.py"), "import pandas\n").unwrap();
        temp
    }

    #[test]
    fn test_second_run_is_up_to_date() {
        let temp = project();
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);
        let catalog = Catalog::build(&repo, &settings, &TaskParams::default());
        let db_path = settings.task_db_path(temp.path());

        let selected = vec!["pyproject".to_string()];
        let mut runner = Runner::new(temp.path(), &shell, &projector, TaskDb::open(&db_path));
        let first = runner.run(&catalog, &selected).unwrap();
        assert_eq!(first.executed(), vec!["requirements", "pyproject"]);
        assert!(first.success());

        let mut runner = Runner::new(temp.path(), &shell, &projector, TaskDb::open(&db_path));
        let second = runner.run(&catalog, &selected).unwrap();
        assert!(second.executed().is_empty());
        assert_eq!(second.state("pyproject"), Some(&TaskState::UpToDate));
    }

    #[test]
    fn test_failure_does_not_stop_siblings() {
        let temp = project();
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        shell.respond(
            "pytest",
            Output {
                code: 1,
                stdout: String::new(),
                stderr: "1 failed".to_string(),
            },
        );
        let projector = Projector::new(&repo, &settings, &shell);
        let catalog = Catalog::build(&repo, &settings, &TaskParams::default());
        let selected = vec!["test".to_string(), "lint".to_string()];

        let mut runner = Runner::new(temp.path(), &shell, &projector, TaskDb::in_memory());
        let report = runner.run(&catalog, &selected).unwrap();
        assert_eq!(report.failed(), vec!["test"]);
        assert_eq!(report.state("lint"), Some(&TaskState::Ok));
        assert_eq!(report.exit_code(), 1);
        assert!(shell.lines().contains(&"pre-commit run --all-files".to_string()));
    }

    #[test]
    fn test_stop_on_failure() {
        let temp = project();
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        shell.respond("flit", Output { code: 2, ..Default::default() });
        let projector = Projector::new(&repo, &settings, &shell);
        let catalog = Catalog::build(&repo, &settings, &TaskParams::default());
        let selected = vec!["build".to_string(), "test".to_string()];

        let mut runner = Runner::new(temp.path(), &shell, &projector, TaskDb::in_memory())
            .stop_on_failure(true);
        let report = runner.run(&catalog, &selected).unwrap();
        assert!(matches!(report.state("build"), Some(TaskState::Failed(_))));
        assert_eq!(report.state("test"), Some(&TaskState::Unknown));
        assert!(!shell.calls().contains(&CommandSpec::new("pytest").cwd(temp.path())));
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        let temp = project();
        let settings = Settings::default();
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        let projector = Projector::new(&repo, &settings, &shell);
        let catalog = Catalog::build(&repo, &settings, &TaskParams::default());
        let mut runner = Runner::new(temp.path(), &shell, &projector, TaskDb::in_memory());
        assert!(runner.run(&catalog, &["publish".to_string()]).is_err());
    }
}
