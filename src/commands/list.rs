//! Implements `qpub list`

use anyhow::Result;
use console::style;

use super::Workspace;
use crate::project::Projector;
use crate::shell::Shell;
use crate::tasks::{Catalog, Runner, TaskDb, TaskParams, TaskState};

/// Print the task catalog with the current state of each task
pub fn execute_list(workspace: &Workspace, params: &TaskParams, shell: &dyn Shell) -> Result<()> {
    let repo = workspace.repository()?;
    let settings = &workspace.settings;
    let catalog = Catalog::build(&repo, settings, params);
    let projector = Projector::new(&repo, settings, shell);
    let db = TaskDb::open(&settings.task_db_path(&workspace.root));
    let runner = Runner::new(&workspace.root, shell, &projector, db);

    for task in catalog.tasks() {
        let state = match runner.evaluate(task) {
            TaskState::UpToDate => style("up to date".to_string()).green(),
            other => style(other.to_string()).yellow(),
        };
        println!("{} {} {}", style(&task.name).bold(), state, style(&task.doc).dim());
        if !task.task_dep.is_empty() {
            println!("    after: {}", task.task_dep.join(", "));
        }
        if !task.targets.is_empty() {
            let targets: Vec<String> = task.targets.iter().map(|t| t.display().to_string()).collect();
            println!("    writes: {}", targets.join(", "));
        }
        for action in &task.actions {
            println!("    {} {}", style("$").dim(), action);
        }
    }
    Ok(())
}
