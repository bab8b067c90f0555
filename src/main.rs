#![forbid(unsafe_code)]
//! qpub command line interface

use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use console::style;

use qpub::commands::{
    execute_configure, execute_env, execute_list, execute_run, execute_verbs, ConfigureOptions,
    RunOptions, VerbOptions, Workspace,
};
use qpub::config::{parse_flag, Backend, Settings};
use qpub::logging::setup_tracing;
use qpub::session::{split_chain, Verb};
use qpub::shell::SystemShell;
use qpub::tasks::{TaskParams, UmlFormat};

#[derive(Parser)]
#[command(name = "qpub")]
#[command(about = "Opinionated packaging and documentation configuration for Python projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run a group of verbs: configure, docs, test, install or all
    #[arg(long, global = true)]
    actions: Option<String>,

    /// Project root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    root: PathBuf,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    params: ParamArgs,
}

/// Per-task parameters
#[derive(Args, Debug, Default)]
struct ParamArgs {
    /// Packaging backend for pyproject
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<Backend>,

    /// Fail the lint task when pre-commit reports problems
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    raises: Option<bool>,

    /// Record runtime types while testing
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    monkeytype: Option<bool>,

    /// Install with pip regardless of the install backend
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    pip: Option<bool>,

    /// Install in editable mode
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    develop: Option<bool>,

    /// Serve the documentation instead of building it once
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    serve: Option<bool>,

    /// Diagram format for uml
    #[arg(long, global = true, value_parser = parse_uml_format)]
    format: Option<UmlFormat>,

    /// Hide attributes and methods in uml diagrams
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = parse_bool)]
    minimal: Option<bool>,
}

impl ParamArgs {
    fn task_params(&self, test_args: Vec<String>) -> TaskParams {
        TaskParams {
            backend: self.backend,
            lint_raises: self.raises.unwrap_or(false),
            monkeytype: self.monkeytype.unwrap_or(false),
            test_args,
            pip: self.pip.unwrap_or(false),
            develop: self.develop.unwrap_or(false),
            serve: self.serve,
            uml_format: self.format.unwrap_or_default(),
            uml_minimal: self.minimal.unwrap_or(false),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    parse_flag(value).ok_or_else(|| format!("expected a boolean, got {}", value))
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    value.parse().map_err(|e: qpub::QpubError| e.to_string())
}

fn parse_uml_format(value: &str) -> Result<UmlFormat, String> {
    value.parse().map_err(|e: qpub::QpubError| e.to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// Write packaging, environment, documentation and lint configuration
    Configure {
        /// Show a diff of every file that would change, without writing
        #[arg(long)]
        diff: bool,

        /// Verbs to run after configuring
        verbs: Vec<String>,
    },

    /// Build a source distribution and wheel
    Build(VerbArgs),

    /// Install the package
    Install(VerbArgs),

    /// Install the package in editable mode
    Develop(VerbArgs),

    /// Run pre-commit on every file
    Lint(VerbArgs),

    /// Run the test suite
    Test(VerbArgs),

    /// Build the documentation
    Docs(VerbArgs),

    /// Run tasks by name, with their dependencies
    Run {
        /// Task names
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Arguments for the test runner
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List tasks and whether they are up to date
    List,

    /// Print the resolved settings as shell exports
    Env,
}

#[derive(Args)]
struct VerbArgs {
    /// Further verbs to chain, then arguments for the test runner
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Commands {
    fn verb(&self) -> Option<(Verb, &[String])> {
        match self {
            Commands::Build(a) => Some((Verb::Build, &a.args)),
            Commands::Install(a) => Some((Verb::Install, &a.args)),
            Commands::Develop(a) => Some((Verb::Develop, &a.args)),
            Commands::Lint(a) => Some((Verb::Lint, &a.args)),
            Commands::Test(a) => Some((Verb::Test, &a.args)),
            Commands::Docs(a) => Some((Verb::Docs, &a.args)),
            _ => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(cli.verbose) {
        eprintln!("{} Failed to set up logging: {}", style("!").yellow(), e);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", style("✗").red(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let shell = SystemShell;
    let mut verbs = match &cli.actions {
        Some(group) => Verb::group(group)?,
        None => Vec::new(),
    };

    let Some(command) = cli.command else {
        if verbs.is_empty() {
            Cli::command().print_help()?;
            return Ok(0);
        }
        let mut workspace = Workspace::load(&cli.root, &shell)?;
        let options = VerbOptions {
            verbs,
            params: cli.params.task_params(Vec::new()),
        };
        return execute_verbs(&mut workspace, options, &shell);
    };

    if let Some((verb, args)) = command.verb() {
        let (chained, rest) = split_chain(args);
        verbs.push(verb);
        verbs.extend(chained);
        let mut workspace = Workspace::load(&cli.root, &shell)?;
        let options = VerbOptions {
            verbs,
            params: cli.params.task_params(rest),
        };
        return execute_verbs(&mut workspace, options, &shell);
    }

    match command {
        Commands::Configure { diff, verbs: chain } => {
            let (chained, rest) = split_chain(&chain);
            verbs.extend(chained);
            let mut workspace = Workspace::load(&cli.root, &shell)?;
            let options = ConfigureOptions {
                diff,
                then: verbs,
                params: cli.params.task_params(rest),
            };
            execute_configure(&mut workspace, options, &shell)
        }

        Commands::Run { tasks, args } => {
            let mut workspace = Workspace::load(&cli.root, &shell)?;
            let options = RunOptions {
                tasks,
                params: cli.params.task_params(args),
            };
            let report = execute_run(&mut workspace, options, &shell)?;
            Ok(report.exit_code())
        }

        Commands::List => {
            let workspace = Workspace::load(&cli.root, &shell)?;
            execute_list(&workspace, &cli.params.task_params(Vec::new()), &shell)?;
            Ok(0)
        }

        Commands::Env => {
            let settings = Settings::resolve(&cli.root)?;
            execute_env(&settings);
            Ok(0)
        }

        _ => Ok(0),
    }
}
