use crate::config::types::{HarnessConfig, QuiescencePolicy, Result};
use crate::config::validator::validate_config;
use crate::harness::probe::{input_demand, InputDemand};
use crate::harness::session::{Poll, ProcessSession};
use crate::harness::{DialogScript, Invocation, ProgramRunner, RunReport};
use crate::observability::events::{events, new_run_id};
use crate::verdict::verdict::{exit_status_diagnostic, signal_diagnostic};
use crate::verdict::{OutcomeClassifier, INPUT_EXHAUSTED_MESSAGE, TIMEOUT_MESSAGE};
use std::time::Instant;

/// How the supervision loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Output streams closed or the child exited
    Finishing,
    InfiniteLoop,
    InputExhausted,
}

/// Decision for one quiet read interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Deliver,
    Exhausted,
    Wait,
}

/// Runs an external program in its own process group
pub struct SubprocessRunner {
    config: HarnessConfig,
}

impl SubprocessRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn next_step(&self, script: &DialogScript, pgid: u32, stdin_inode: Option<u64>) -> Step {
        if !script.is_exhausted() {
            return match self.config.quiescence {
                QuiescencePolicy::AssumeAwaitingInput => Step::Deliver,
                QuiescencePolicy::RequireInputDemand => {
                    match input_demand(pgid, stdin_inode, self.config.input_probe) {
                        InputDemand::NotBlocked => Step::Wait,
                        InputDemand::Blocked | InputDemand::Unknown => Step::Deliver,
                    }
                }
            };
        }

        match input_demand(pgid, stdin_inode, self.config.input_probe) {
            InputDemand::Blocked => Step::Exhausted,
            InputDemand::NotBlocked | InputDemand::Unknown => Step::Wait,
        }
    }

    /// Kill the group, reap the leader and collect trailing output
    fn force_kill(&self, session: &mut ProcessSession, run_id: &str, reason: &str) -> Result<()> {
        let report = session.kill();
        for note in &report.notes {
            log::warn!("kill pid {}: {}", session.pid(), note);
        }
        events::forced_kill(run_id, session.pid(), reason);
        session.reap()?;
        session.drain(self.config.drain_timeout);
        Ok(())
    }

    fn supervise(
        &self,
        session: &mut ProcessSession,
        script: &mut DialogScript,
        run_id: &str,
        deadline: Instant,
        inputs_consumed: &mut usize,
    ) -> Result<LoopExit> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(LoopExit::InfiniteLoop);
            }
            let wait = self.config.read_timeout.min(deadline - now);

            match session.poll(wait) {
                Poll::Output => {}
                Poll::StreamClosed => {
                    if !session.streams_open() {
                        return Ok(LoopExit::Finishing);
                    }
                }
                Poll::Quiet => {
                    // A wait shortened by the deadline is not a full quiet interval.
                    if wait < self.config.read_timeout {
                        continue;
                    }
                    if session.has_exited()? {
                        return Ok(LoopExit::Finishing);
                    }

                    let elapsed_ms = session.elapsed().as_millis() as u64;
                    events::quiescent(run_id, script.remaining(), elapsed_ms);

                    match self.next_step(script, session.pid(), session.stdin_inode()) {
                        Step::Deliver => {
                            let Some(line) = script.peek().map(str::to_string) else {
                                continue;
                            };
                            if session.deliver(&line) {
                                script.next_input();
                                *inputs_consumed += 1;
                                if self.config.echo_inputs {
                                    session.record_echo(&line);
                                }
                                events::input_delivered(run_id, *inputs_consumed, elapsed_ms);
                            }
                        }
                        Step::Exhausted => return Ok(LoopExit::InputExhausted),
                        Step::Wait => {}
                    }
                }
            }
        }
    }
}

impl ProgramRunner for SubprocessRunner {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn run(&self, invocation: &Invocation) -> Result<RunReport> {
        validate_config(&self.config).into_result("harness")?;

        let run_id = new_run_id();
        let mut script = invocation.script.clone();
        let mut session = ProcessSession::spawn(invocation, &self.config)?;
        events::run_start(&run_id, &invocation.program, Some(session.pid()));

        let finish_deadline = Instant::now() + self.config.finish_timeout;
        let mut inputs_consumed = 0;
        let exit = self.supervise(
            &mut session,
            &mut script,
            &run_id,
            finish_deadline,
            &mut inputs_consumed,
        )?;

        let diagnostic = match exit {
            LoopExit::Finishing => match session.wait_until(finish_deadline)? {
                Some(_) => {
                    session.drain(self.config.drain_timeout);
                    session.kill_stragglers();
                    if let Some(code) = session.exit_code().filter(|c| *c != 0) {
                        exit_status_diagnostic(code)
                    } else if let Some(signal) = session.signal() {
                        signal_diagnostic(signal)
                    } else {
                        String::new()
                    }
                }
                None => {
                    self.force_kill(&mut session, &run_id, "finish timeout after output closed")?;
                    TIMEOUT_MESSAGE.to_string()
                }
            },
            LoopExit::InfiniteLoop => {
                self.force_kill(&mut session, &run_id, "finish timeout")?;
                TIMEOUT_MESSAGE.to_string()
            }
            LoopExit::InputExhausted => {
                events::input_exhausted(&run_id, inputs_consumed);
                self.force_kill(&mut session, &run_id, "input exhausted")?;
                INPUT_EXHAUSTED_MESSAGE.to_string()
            }
        };

        let outcome = OutcomeClassifier::classify(&diagnostic);
        let elapsed_ms = session.elapsed().as_millis() as u64;
        events::run_end(&run_id, &outcome.to_string(), elapsed_ms);

        let (exit_code, signal) = match exit {
            LoopExit::Finishing => (session.exit_code(), session.signal()),
            _ => (None, session.signal()),
        };

        Ok(RunReport {
            run_id,
            stdout: session.stdout_text(),
            stderr: session.stderr_text(),
            diagnostic,
            outcome,
            exit_code,
            signal,
            inputs_consumed,
            output_integrity: session.integrity(),
            elapsed_ms,
        })
    }
}
