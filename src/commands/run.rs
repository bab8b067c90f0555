//! Run named tasks and their dependencies

use anyhow::{Context, Result};
use console::style;

use super::Workspace;
use crate::project::Projector;
use crate::shell::Shell;
use crate::tasks::{Catalog, Report, Runner, TaskDb, TaskParams, TaskState};

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub tasks: Vec<String>,
    pub params: TaskParams,
}

/// Execute the run command
pub fn execute_run(workspace: &mut Workspace, options: RunOptions, shell: &dyn Shell) -> Result<Report> {
    let repo = workspace.repository()?;
    workspace.ensure_name(&repo)?;

    let settings = &workspace.settings;
    let catalog = Catalog::build(&repo, settings, &options.params);
    let projector = Projector::new(&repo, settings, shell)
        .with_python_version(workspace.python_version.clone());
    let db = TaskDb::open(&settings.task_db_path(&workspace.root));

    let mut runner = Runner::new(&workspace.root, shell, &projector, db)
        .stop_on_failure(settings.stop_on_failure);
    let report = runner
        .run(&catalog, &options.tasks)
        .with_context(|| format!("Failed to run {}", options.tasks.join(", ")))?;

    print_report(&report);
    Ok(report)
}

/// One line per planned task
pub fn print_report(report: &Report) {
    for (name, state) in &report.results {
        match state {
            TaskState::Ok => println!("{} {}", style("✓").green(), name),
            TaskState::UpToDate => println!("{} {} {}", style("-").dim(), name, style("(up to date)").dim()),
            TaskState::Failed(reason) => eprintln!("{} {}: {}", style("✗").red(), name, reason),
            other => println!("{} {} {}", style("!").yellow(), name, style(format!("({})", other)).dim()),
        }
    }
}
