/// Run outcome classification
///
/// The diagnostic string is the single source of truth for how a run ended;
/// the coarse outcome is derived from it by a pure function.
use serde::{Deserialize, Serialize};

/// Diagnostic when the program asks for more input than the script holds
pub const INPUT_EXHAUSTED_MESSAGE: &str = "input called more times than expected";

/// Diagnostic when the finish timeout expires
pub const TIMEOUT_MESSAGE: &str =
    "program failed to finish in the expected amount of time; possible infinite loop";

/// Coarse run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    InputExhausted,
    Timeout,
    Crashed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::InputExhausted => write!(f, "input_exhausted"),
            RunOutcome::Timeout => write!(f, "timeout"),
            RunOutcome::Crashed => write!(f, "crashed"),
        }
    }
}

/// Outcome classifier - pure function over the diagnostic
///
/// Only the exact harness messages map to `InputExhausted` and `Timeout`;
/// any other text, including a crash trace quoting them, is a crash.
pub struct OutcomeClassifier;

impl OutcomeClassifier {
    pub fn classify(diagnostic: &str) -> RunOutcome {
        if diagnostic.is_empty() {
            RunOutcome::Success
        } else if diagnostic == INPUT_EXHAUSTED_MESSAGE {
            RunOutcome::InputExhausted
        } else if diagnostic == TIMEOUT_MESSAGE {
            RunOutcome::Timeout
        } else {
            RunOutcome::Crashed
        }
    }
}

/// Crash diagnostic for a non-zero exit code
pub fn exit_status_diagnostic(code: i32) -> String {
    format!("program exited with status {}", code)
}

/// Crash diagnostic for death by signal
pub fn signal_diagnostic(signal: i32) -> String {
    format!("program terminated by signal {}", signal)
}
