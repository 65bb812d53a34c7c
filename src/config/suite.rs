/// Suite loading from a JSON file
///
/// Relative paths in a suite resolve against the directory holding the
/// suite file. Program names without a path separator are looked up on
/// `PATH` by the spawner.
use crate::config::types::{CostParams, GradeError, HarnessConfig, Result, DEFAULT_GAP_MARKER};
use crate::grading::{PolicyKind, TestCase, TranscriptSource};
use crate::harness::DialogScript;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_gap_marker() -> char {
    DEFAULT_GAP_MARKER
}

fn default_max_score() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedFileConfig {
    /// File holding the expected contents
    pub expected: PathBuf,
    /// File the program writes
    pub observed: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseConfig {
    pub name: String,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: DialogScript,
    /// Inline expected transcript
    #[serde(default)]
    pub expected: Option<String>,
    /// Expected transcript file, used when `expected` is absent
    #[serde(default)]
    pub expected_file: Option<PathBuf>,
    #[serde(default)]
    pub expected_files: Vec<ExpectedFileConfig>,
}

/// Full suite file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub costs: CostParams,
    #[serde(default = "default_gap_marker")]
    pub gap_marker: char,
    #[serde(default)]
    pub policy: PolicyKind,
    pub tests: Vec<TestCaseConfig>,
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl SuiteConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GradeError::Usage(format!("Failed to read suite file {:?}: {}", path, e)))?;

        let mut suite: SuiteConfig = serde_json::from_str(&content)
            .map_err(|e| GradeError::Usage(format!("Failed to parse suite JSON: {}", e)))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        suite.resolve_paths(base);
        Ok(suite)
    }

    /// Make every relative path in the suite absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(ref workdir) = self.harness.workdir {
            self.harness.workdir = Some(resolve(base, workdir));
        }
        let observed_base = self.harness.workdir.clone().unwrap_or_else(|| base.to_path_buf());

        for test in &mut self.tests {
            if test.program.contains('/') {
                test.program = resolve(base, Path::new(&test.program))
                    .to_string_lossy()
                    .into_owned();
            }
            if let Some(ref file) = test.expected_file {
                test.expected_file = Some(resolve(base, file));
            }
            for pair in &mut test.expected_files {
                pair.expected = resolve(base, &pair.expected);
                pair.observed = resolve(&observed_base, &pair.observed);
            }
        }
    }

    pub fn test_cases(&self) -> Result<Vec<TestCase>> {
        self.tests.iter().map(TestCaseConfig::to_test_case).collect()
    }
}

impl TestCaseConfig {
    pub fn to_test_case(&self) -> Result<TestCase> {
        let expected = match (&self.expected, &self.expected_file) {
            (Some(text), _) => TranscriptSource::Inline(text.clone()),
            (None, Some(path)) => TranscriptSource::File(path.clone()),
            (None, None) => {
                return Err(GradeError::Usage(format!(
                    "test {}: needs `expected` or `expected_file`",
                    self.name
                )))
            }
        };

        let mut case = TestCase::new(self.name.clone(), self.program.clone(), expected)
            .with_max_score(self.max_score)
            .with_args(self.args.iter().cloned());
        case.script = self.inputs.clone();
        for pair in &self.expected_files {
            case = case.with_expected_file(
                TranscriptSource::File(pair.expected.clone()),
                pair.observed.clone(),
            );
        }
        case.validate()?;
        Ok(case)
    }
}
