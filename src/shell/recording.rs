//! Shell double that records commands instead of running them

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{CommandSpec, Output, Shell};
use crate::error::Result;

/// Records every command and replies with scripted outputs
///
/// Replies are queued per program; a program without a queued reply exits
/// with status 0 and no output. `which` answers for the programs registered
/// with [`with_programs`](Self::with_programs).
#[derive(Debug, Default)]
pub struct RecordingShell {
    calls: Mutex<Vec<CommandSpec>>,
    replies: Mutex<HashMap<String, VecDeque<Output>>>,
    programs: BTreeSet<String>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs `which` should find
    pub fn with_programs<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.programs.extend(programs.into_iter().map(Into::into));
        self
    }

    /// Queue a reply for the next run of `program`
    pub fn respond(&self, program: &str, output: Output) {
        if let Ok(mut replies) = self.replies.lock() {
            replies
                .entry(program.to_string())
                .or_default()
                .push_back(output);
        }
    }

    /// Commands run so far
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines run so far
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::line).collect()
    }
}

impl Shell for RecordingShell {
    fn run(&self, spec: &CommandSpec) -> Result<Output> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.get_mut(&spec.program).and_then(VecDeque::pop_front));
        Ok(reply.unwrap_or_default())
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        self.programs
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}
