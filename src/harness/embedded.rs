//! Embedded execution mode
//!
//! Runs a Rust entry point on a worker thread of the supervising process.
//! The program talks to the dialog through an injected [`DialogIo`]; output
//! streams back over a channel. A run that outlives `finish_timeout` is
//! abandoned: the cancellation flag silences its I/O and the supervisor
//! stops listening, but a worker spinning without touching its I/O keeps
//! running detached until the process exits.

use crate::config::types::{GradeError, Result};
use crate::harness::output::BoundedBuffer;
use crate::harness::{DialogScript, Invocation, ProgramRunner, RunReport};
use crate::observability::events::{events, new_run_id};
use crate::verdict::{OutcomeClassifier, INPUT_EXHAUSTED_MESSAGE, TIMEOUT_MESSAGE};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogIoError {
    #[error("input called more times than expected")]
    InputExhausted,
    #[error("run abandoned by the supervisor")]
    Abandoned,
}

/// Console of an embedded program
pub trait DialogIo {
    /// Show `prompt`, then return the next scripted input
    fn input(&mut self, prompt: &str) -> std::result::Result<String, DialogIoError>;

    fn print(&mut self, text: &str);

    /// Arguments of the invocation
    fn args(&self) -> &[String];
}

/// Entry point run by [`EmbeddedRunner`]
pub type EmbeddedProgram = Arc<dyn Fn(&mut dyn DialogIo) -> anyhow::Result<()> + Send + Sync>;

enum WorkerEvent {
    Output(String),
    InputConsumed,
    InputExhausted,
    /// Trace text when the program failed
    Finished(Option<String>),
}

struct ScriptedIo {
    args: Vec<String>,
    script: DialogScript,
    echo_inputs: bool,
    cancelled: Arc<AtomicBool>,
    tx: Sender<WorkerEvent>,
}

impl ScriptedIo {
    fn abandoned(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl DialogIo for ScriptedIo {
    fn input(&mut self, prompt: &str) -> std::result::Result<String, DialogIoError> {
        self.print(prompt);
        if self.abandoned() {
            return Err(DialogIoError::Abandoned);
        }
        match self.script.next_input() {
            Some(line) => {
                if self.echo_inputs {
                    self.print(&format!("{}\n", line));
                }
                let _ = self.tx.send(WorkerEvent::InputConsumed);
                Ok(line)
            }
            None => {
                let _ = self.tx.send(WorkerEvent::InputExhausted);
                Err(DialogIoError::InputExhausted)
            }
        }
    }

    fn print(&mut self, text: &str) {
        if text.is_empty() || self.abandoned() {
            return;
        }
        let _ = self.tx.send(WorkerEvent::Output(text.to_string()));
    }

    fn args(&self) -> &[String] {
        &self.args
    }
}

fn error_trace(err: &anyhow::Error) -> String {
    let mut trace = format!("\nException: {}\n", err);
    for cause in err.chain().skip(1) {
        trace.push_str(&format!("  caused by: {}\n", cause));
    }
    trace
}

fn panic_trace(payload: Box<dyn Any + Send>) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    format!("\nException: panicked: {}\n", message)
}

/// Runs an [`EmbeddedProgram`] under a watchdog
pub struct EmbeddedRunner {
    program: EmbeddedProgram,
    finish_timeout: Duration,
    echo_inputs: bool,
    output_limit: usize,
}

impl EmbeddedRunner {
    pub fn new<F>(program: F, finish_timeout: Duration) -> Self
    where
        F: Fn(&mut dyn DialogIo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            program: Arc::new(program),
            finish_timeout,
            echo_inputs: true,
            output_limit: 8 * 1024 * 1024,
        }
    }

    pub fn with_echo_inputs(mut self, echo_inputs: bool) -> Self {
        self.echo_inputs = echo_inputs;
        self
    }

    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.output_limit = output_limit;
        self
    }
}

impl ProgramRunner for EmbeddedRunner {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn run(&self, invocation: &Invocation) -> Result<RunReport> {
        if self.finish_timeout == Duration::ZERO {
            return Err(GradeError::Usage("finish_timeout cannot be zero".to_string()));
        }

        let run_id = new_run_id();
        let started = Instant::now();
        let deadline = started + self.finish_timeout;
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut io = ScriptedIo {
            args: invocation.args.clone(),
            script: invocation.script.clone(),
            echo_inputs: self.echo_inputs,
            cancelled: Arc::clone(&cancelled),
            tx,
        };
        let program = Arc::clone(&self.program);

        std::thread::Builder::new()
            .name("gradebox-embedded".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*program)(&mut io)));
                let trace = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(error_trace(&err)),
                    Err(payload) => Some(panic_trace(payload)),
                };
                let _ = io.tx.send(WorkerEvent::Finished(trace));
            })
            .map_err(|e| GradeError::Spawn(format!("embedded worker: {}", e)))?;
        events::run_start(&run_id, &invocation.program, None);

        let mut transcript = BoundedBuffer::new(self.output_limit);
        let mut inputs_consumed = 0;
        let mut exhausted = false;
        let mut timed_out = false;
        let mut crash: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(WorkerEvent::Output(text)) => transcript.push(text.as_bytes()),
                Ok(WorkerEvent::InputConsumed) => inputs_consumed += 1,
                Ok(WorkerEvent::InputExhausted) => exhausted = true,
                Ok(WorkerEvent::Finished(trace)) => {
                    if let Some(trace) = trace {
                        transcript.push(trace.as_bytes());
                        crash = Some(trace.trim().to_string());
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::Release);
                    timed_out = true;
                    log::warn!(
                        "embedded run {} abandoned after {:?}",
                        run_id,
                        self.finish_timeout
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GradeError::Internal(
                        "embedded worker exited without reporting".to_string(),
                    ));
                }
            }
        }

        let diagnostic = if exhausted {
            events::input_exhausted(&run_id, inputs_consumed);
            INPUT_EXHAUSTED_MESSAGE.to_string()
        } else if timed_out {
            TIMEOUT_MESSAGE.to_string()
        } else {
            crash.unwrap_or_default()
        };

        let outcome = OutcomeClassifier::classify(&diagnostic);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        events::run_end(&run_id, &outcome.to_string(), elapsed_ms);

        Ok(RunReport {
            run_id,
            stdout: transcript.to_text(),
            stderr: String::new(),
            diagnostic,
            outcome,
            exit_code: None,
            signal: None,
            inputs_consumed,
            output_integrity: transcript.integrity(),
            elapsed_ms,
        })
    }
}
