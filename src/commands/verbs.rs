//! Run chained verbs, optionally each in its own environment

use anyhow::{Context, Result};
use console::style;

use super::{execute_run, RunOptions, Workspace};
use crate::session::{compose, forward_args, Session, Verb};
use crate::shell::Shell;
use crate::tasks::{Catalog, TaskParams};

/// Options for verb commands
#[derive(Debug, Clone, Default)]
pub struct VerbOptions {
    pub verbs: Vec<Verb>,
    pub params: TaskParams,
}

/// Execute a chain of verbs and return the process exit code
pub fn execute_verbs(workspace: &mut Workspace, options: VerbOptions, shell: &dyn Shell) -> Result<i32> {
    let repo = workspace.repository()?;
    workspace.ensure_name(&repo)?;
    let catalog = Catalog::build(&repo, &workspace.settings, &options.params);

    if !workspace.settings.isolate {
        let tasks = compose(&options.verbs, &catalog, &workspace.settings);
        if tasks.is_empty() {
            println!("{} Nothing to do", style("→").cyan());
            return Ok(0);
        }
        let report = execute_run(
            workspace,
            RunOptions {
                tasks,
                params: options.params,
            },
            shell,
        )?;
        return Ok(report.exit_code());
    }

    let program = std::env::current_exe().context("Failed to locate the qpub executable")?;
    let session = Session::new(&workspace.root, &workspace.settings, shell);
    let args = forward_args(&options.params);
    let mut verbs = options.verbs.clone();
    verbs.sort();
    verbs.dedup();
    let mut code = 0;
    for verb in &verbs {
        let tasks = verb.tasks(&catalog, &workspace.settings);
        if tasks.is_empty() {
            continue;
        }
        println!("{} {} in an isolated environment", style("→").cyan(), verb);
        let env = session
            .prepare(*verb, &options.params)
            .with_context(|| format!("Failed to prepare the {} environment", verb))?;
        let status = session.run_isolated(&env, &program, &tasks, &args)?;
        if status != 0 {
            eprintln!("{} {} exited with {}", style("✗").red(), verb, status);
            code = status;
            if workspace.settings.stop_on_failure {
                break;
            }
        }
    }
    Ok(code)
}
