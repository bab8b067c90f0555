//! External command interface
//!
//! Every third-party tool (linters, builders, package managers) is reached
//! through [`Shell`]. [`SystemShell`] spawns real processes; [`RecordingShell`]
//! records what would have run and answers with scripted outputs.

pub mod recording;

pub use recording::RecordingShell;

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{QpubError, Result};

/// A command line to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Capture output instead of streaming it to the terminal
    pub capture: bool,
}

impl CommandSpec {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Program and arguments as one line
    pub fn line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(' ') {
                    format!("\"{}\"", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line())
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external commands
pub trait Shell {
    /// Run a command to completion; a non-zero exit is not an error here
    fn run(&self, spec: &CommandSpec) -> Result<Output>;

    /// Locate a program on the search path
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run and fail with `ExternalCommandFailed` on a non-zero exit
    fn check(&self, spec: &CommandSpec) -> Result<Output> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(QpubError::ExternalCommandFailed {
                command: spec.line(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

/// Spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, spec: &CommandSpec) -> Result<Output> {
        tracing::info!("running {}", spec.line());
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        if spec.capture {
            let output = command.stdin(Stdio::null()).output()?;
            Ok(Output {
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        } else {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            Ok(Output {
                code: status.code().unwrap_or(-1),
                ..Default::default()
            })
        }
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// `major.minor` of the Python interpreter on the path
pub fn python_version(shell: &dyn Shell) -> Option<String> {
    let program = ["python3", "python"]
        .into_iter()
        .find(|p| shell.which(p).is_some())?;
    let spec = CommandSpec::new(program)
        .args(["-c", "import sys; print('%d.%d' % sys.version_info[:2])"])
        .capture();
    match shell.run(&spec) {
        Ok(out) if out.success() => {
            let version = out.stdout.trim().to_string();
            (!version.is_empty()).then_some(version)
        }
        Ok(out) => {
            tracing::debug!("python version probe failed: {}", out.stderr);
            None
        }
        Err(e) => {
            tracing::debug!("python version probe failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let spec = CommandSpec::new("pip")
            .args(["install", "-e", "."])
            .arg("--no-deps")
            .arg("a b");
        assert_eq!(spec.line(), "pip install -e . --no-deps \"a b\"");
        assert!(!spec.capture);
    }

    #[test]
    fn test_check_maps_failure() {
        let shell = RecordingShell::new();
        shell.respond(
            "flit",
            Output {
                code: 2,
                stdout: String::new(),
                stderr: "boom".to_string(),
            },
        );
        let err = shell.check(&CommandSpec::new("flit").arg("build")).unwrap_err();
        match err {
            QpubError::ExternalCommandFailed {
                command,
                code,
                stderr,
            } => {
                assert_eq!(command, "flit build");
                assert_eq!(code, 2);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_python_version_probe() {
        let shell = RecordingShell::new().with_programs(["python3"]);
        shell.respond(
            "python3",
            Output {
                code: 0,
                stdout: "3.11\n".to_string(),
                stderr: String::new(),
            },
        );
        assert_eq!(python_version(&shell).as_deref(), Some("3.11"));
        assert_eq!(python_version(&RecordingShell::new()), None);
    }
}
