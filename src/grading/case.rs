/// Test case description
use crate::config::types::{GradeError, Result};
use crate::harness::{DialogScript, Invocation};
use std::path::{Path, PathBuf};

/// Where an expected transcript comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSource {
    Inline(String),
    File(PathBuf),
}

impl TranscriptSource {
    /// Read the transcript; an unreadable file is a usage error
    pub fn load(&self) -> Result<String> {
        match self {
            TranscriptSource::Inline(text) => Ok(text.clone()),
            TranscriptSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                GradeError::Usage(format!("cannot read expected transcript {:?}: {}", path, e))
            }),
        }
    }
}

/// Expected contents of a file the program writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub expected: TranscriptSource,
    /// Path the program writes; a missing file counts as empty output
    pub observed_path: PathBuf,
}

impl ExpectedFile {
    pub fn label(&self) -> String {
        self.observed_path.display().to_string()
    }

    pub fn read_observed(&self) -> String {
        read_observed(&self.observed_path)
    }
}

fn read_observed(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            log::warn!("observed file {:?} unreadable, scoring as empty: {}", path, e);
            String::new()
        }
    }
}

/// One graded dialog: program, script and what it should produce
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub max_score: f64,
    pub program: String,
    pub args: Vec<String>,
    pub script: DialogScript,
    pub expected: TranscriptSource,
    pub expected_files: Vec<ExpectedFile>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, program: impl Into<String>, expected: TranscriptSource) -> Self {
        Self {
            name: name.into(),
            max_score: 1.0,
            program: program.into(),
            args: Vec::new(),
            script: DialogScript::default(),
            expected,
            expected_files: Vec::new(),
        }
    }

    pub fn with_max_score(mut self, max_score: f64) -> Self {
        self.max_score = max_score;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script = DialogScript::new(inputs);
        self
    }

    pub fn with_expected_file(mut self, expected: TranscriptSource, observed_path: impl Into<PathBuf>) -> Self {
        self.expected_files.push(ExpectedFile {
            expected,
            observed_path: observed_path.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GradeError::Usage("test case without a name".to_string()));
        }
        if !self.max_score.is_finite() || self.max_score < 0.0 {
            return Err(GradeError::Usage(format!(
                "test case {}: max_score must be a non-negative number, got {}",
                self.name, self.max_score
            )));
        }
        Ok(())
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new(self.program.clone())
            .with_args(self.args.iter().cloned())
            .with_script(self.script.clone())
    }
}
