//! Dialog harness
//!
//! Drives a program through a scripted conversation and captures the
//! transcript it produces under two composed timeouts: `read_timeout`
//! bounds one quiet interval, `finish_timeout` bounds the whole run.
//!
//! Two runners implement [`ProgramRunner`]:
//! - [`SubprocessRunner`]: external program in its own process group,
//!   killed on timeout or confirmed input exhaustion
//! - [`EmbeddedRunner`]: Rust entry point on a worker thread with an
//!   injected [`DialogIo`]; timeouts can only abandon the worker
//!
//! Misbehavior of the program under test is reported through
//! [`RunReport::diagnostic`], never as an error.

pub mod embedded;
pub mod output;
pub mod probe;
pub mod session;
pub mod supervisor;

pub use embedded::{DialogIo, DialogIoError, EmbeddedProgram, EmbeddedRunner};
pub use supervisor::SubprocessRunner;

use crate::config::types::{HarnessConfig, OutputIntegrity, Result};
use crate::verdict::RunOutcome;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Ordered scripted inputs, one consumed per input request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogScript {
    inputs: VecDeque<String>,
}

impl DialogScript {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Next input in script order
    pub fn next_input(&mut self) -> Option<String> {
        self.inputs.pop_front()
    }

    pub fn peek(&self) -> Option<&str> {
        self.inputs.front().map(String::as_str)
    }

    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// What to run
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub script: DialogScript,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_script(mut self, script: DialogScript) -> Self {
        self.script = script;
        self
    }
}

/// Result of one dialog run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// Observed transcript: program output plus echoed inputs in production order
    pub stdout: String,
    /// Separate stderr capture; empty when stderr is merged
    pub stderr: String,
    /// Empty on success, otherwise why the run ended early or badly
    pub diagnostic: String,
    pub outcome: RunOutcome,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub inputs_consumed: usize,
    pub output_integrity: OutputIntegrity,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Text to grade: stdout, followed by the separately captured stderr
    /// when the run did not succeed
    pub fn transcript(&self) -> String {
        if self.outcome == RunOutcome::Success || self.stderr.is_empty() {
            return self.stdout.clone();
        }
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

/// A way of executing a program against a dialog script
pub trait ProgramRunner {
    /// Runner name for logs and reports
    fn name(&self) -> &'static str;

    /// Execute `invocation`; only harness faults and usage mistakes are errors.
    fn run(&self, invocation: &Invocation) -> Result<RunReport>;
}

/// Run `command` as a subprocess with the default harness settings and the given timeouts
pub fn run_dialog<I, S>(
    command: &str,
    args: &[String],
    inputs: I,
    read_timeout: Duration,
    finish_timeout: Duration,
) -> Result<RunReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let runner = SubprocessRunner::new(HarnessConfig::with_timeouts(read_timeout, finish_timeout));
    let invocation = Invocation::new(command)
        .with_args(args.iter().cloned())
        .with_script(DialogScript::new(inputs));
    runner.run(&invocation)
}
