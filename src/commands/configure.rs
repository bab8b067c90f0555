//! Implements `qpub configure`

use anyhow::{Context, Result};
use console::style;

use super::{execute_verbs, VerbOptions, Workspace};
use crate::project::Projector;
use crate::session::Verb;
use crate::shell::Shell;
use crate::tasks::{Action, Catalog, TaskParams};

/// Options for the configure command
#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    /// Print what would change instead of writing
    pub diff: bool,
    /// Verbs chained after configure
    pub then: Vec<Verb>,
    pub params: TaskParams,
}

/// Execute the configure command and return the process exit code
pub fn execute_configure(workspace: &mut Workspace, options: ConfigureOptions, shell: &dyn Shell) -> Result<i32> {
    if !options.diff {
        let mut verbs = vec![Verb::Configure];
        verbs.extend(options.then);
        return execute_verbs(
            workspace,
            VerbOptions {
                verbs,
                params: options.params,
            },
            shell,
        );
    }

    let repo = workspace.repository()?;
    workspace.ensure_name(&repo)?;
    let settings = &workspace.settings;
    let catalog = Catalog::build(&repo, settings, &options.params);
    let projector = Projector::new(&repo, settings, shell)
        .with_python_version(workspace.python_version.clone());

    let mut unchanged = 0;
    for name in Verb::Configure.tasks(&catalog, settings) {
        let Some(task) = catalog.get(&name) else {
            continue;
        };
        for action in &task.actions {
            let Action::Project(artifact) = action else {
                continue;
            };
            let rendered = projector
                .render(*artifact)
                .with_context(|| format!("Failed to render {}", artifact))?;
            for file in rendered {
                if file.changed() {
                    print!("{}", file.diff());
                } else {
                    unchanged += 1;
                }
            }
        }
    }
    if unchanged > 0 {
        println!("{} {} file(s) already up to date", style("✓").green(), unchanged);
    }
    Ok(0)
}
