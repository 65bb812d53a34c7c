/// Core types and structures for the gradebox system
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default placeholder used when rendering aligned text.
pub const DEFAULT_GAP_MARKER: char = '~';

/// Substitution cost for a mismatching symbol pair
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Substitution {
    /// Mismatch may be aligned in one column at this cost
    Cost(u32),
    /// Mismatch must be expressed as a deletion plus an insertion
    Disallowed,
}

/// Alignment cost parameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostParams {
    /// Cost of aligning a symbol against a gap (insertion and deletion alike)
    pub gap: u32,
    /// Cost of aligning two different symbols in one column
    pub substitution: Substitution,
}

impl CostParams {
    pub fn new(gap: u32, substitution: Substitution) -> Self {
        Self { gap, substitution }
    }

    /// Gap-only alignment: mismatches become delete + insert pairs.
    pub fn gaps_only(gap: u32) -> Self {
        Self::new(gap, Substitution::Disallowed)
    }

    /// Classic Levenshtein weights.
    pub fn levenshtein() -> Self {
        Self::new(1, Substitution::Cost(1))
    }
}

impl Default for CostParams {
    /// Transcript comparison default: unit gaps, no substitutions
    fn default() -> Self {
        Self::gaps_only(1)
    }
}

/// Decides when an exhausted script means the program is asking for more input
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputProbe {
    /// Inspect `/proc/<pid>/syscall` (fallback `/proc/<pid>/wchan`) for a blocked stdin read
    ProcSyscall,
    /// Never conclude exhaustion; the run ends on exit or finish timeout
    Disabled,
}

impl Default for InputProbe {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            InputProbe::ProcSyscall
        } else {
            InputProbe::Disabled
        }
    }
}

/// When a quiet read interval is taken as a request for the next scripted input
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuiescencePolicy {
    /// No output within `read_timeout` means the program waits for input.
    /// Slow-but-progressing programs are indistinguishable from blocked ones.
    #[default]
    AssumeAwaitingInput,
    /// Deliver only when the input probe confirms a blocked stdin read;
    /// falls back to `AssumeAwaitingInput` when the probe cannot answer
    RequireInputDemand,
}

/// Output limits configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputLimits {
    /// Per-stream stdout limit (bytes)
    pub stdout_limit: usize,
    /// Per-stream stderr limit (bytes)
    pub stderr_limit: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 8 * 1024 * 1024, // 8 MB stdout
            stderr_limit: 2 * 1024 * 1024, // 2 MB stderr
        }
    }
}

/// Supervision settings for one dialog run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Longest quiet interval before the program is assumed to wait for input
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// Hard wall-clock ceiling for the whole run
    #[serde(with = "duration_ms")]
    pub finish_timeout: Duration,
    /// Bounded wait for trailing output after the child is reaped
    #[serde(with = "duration_ms")]
    pub drain_timeout: Duration,
    /// Route stderr into the stdout pipe so the transcript keeps production order
    pub merge_stderr: bool,
    /// Append each delivered input (plus newline) to the observed transcript
    pub echo_inputs: bool,
    pub input_probe: InputProbe,
    pub quiescence: QuiescencePolicy,
    pub output_limits: OutputLimits,
    /// Extra environment variables for the child
    pub environment: Vec<(String, String)>,
    /// Working directory for the child (inherits the caller's when unset)
    pub workdir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(500),
            finish_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_millis(200),
            merge_stderr: true,
            echo_inputs: true,
            input_probe: InputProbe::default(),
            quiescence: QuiescencePolicy::default(),
            output_limits: OutputLimits::default(),
            environment: Vec::new(),
            workdir: None,
        }
    }
}

impl HarnessConfig {
    pub fn with_timeouts(read_timeout: Duration, finish_timeout: Duration) -> Self {
        Self {
            read_timeout,
            finish_timeout,
            ..Self::default()
        }
    }
}

/// Serde adapter storing durations as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Output integrity classification
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
        }
    }
}

/// Custom error types for gradebox
///
/// `Usage` is a caller mistake; every other variant is a harness fault.
/// Misbehavior of the program under test is never an error.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Failed to spawn program: {0}")]
    Spawn(String),

    #[error("Pipe setup error: {0}")]
    Pipe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal harness error: {0}")]
    Internal(String),
}

impl GradeError {
    /// True for configuration mistakes, false for broken-environment faults.
    pub fn is_usage(&self) -> bool {
        matches!(self, GradeError::Usage(_))
    }
}

impl From<nix::errno::Errno> for GradeError {
    fn from(err: nix::errno::Errno) -> Self {
        GradeError::Internal(err.to_string())
    }
}

/// Result type alias for gradebox operations
pub type Result<T> = std::result::Result<T, GradeError>;
