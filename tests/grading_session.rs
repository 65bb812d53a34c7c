//! End-to-end grading: suite files on disk, real subprocesses, and the CLI
#![cfg(target_os = "linux")]

use gradebox::config::suite::SuiteConfig;
use gradebox::grading::{GradingSession, TestCase, TranscriptSource};
use gradebox::harness::{DialogIo, EmbeddedRunner, SubprocessRunner};
use gradebox::verdict::RunOutcome;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

const PROGRAM: &str = r#"printf 'a? '
read a
printf 'b? '
read b
echo "sum $((a + b))"
echo "$a,$b" > out.txt
"#;

const SUITE: &str = r#"{
    "harness": {"read_timeout": 200, "finish_timeout": 5000, "workdir": "."},
    "tests": [
        {
            "name": "exact",
            "max_score": 3,
            "program": "sh",
            "args": ["prog.sh"],
            "inputs": ["2", "3"],
            "expected_file": "sum.expected",
            "expected_files": [{"expected": "out.expected", "observed": "out.txt"}]
        },
        {
            "name": "wrong_sum",
            "max_score": 3,
            "program": "sh",
            "args": ["prog.sh"],
            "inputs": ["2", "3"],
            "expected": "a? 2\nb? 3\nsum 6\n"
        },
        {
            "name": "missing_file",
            "program": "sh",
            "args": ["-c", "echo hi"],
            "expected": "hi\n",
            "expected_files": [{"expected": "never.expected", "observed": "never.txt"}]
        }
    ]
}"#;

fn write_suite() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("prog.sh"), PROGRAM).unwrap();
    fs::write(root.join("sum.expected"), "a? 2\nb? 3\nsum 5\n").unwrap();
    fs::write(root.join("out.expected"), "2,3\n").unwrap();
    fs::write(root.join("never.expected"), "x\n").unwrap();
    fs::write(root.join("suite.json"), SUITE).unwrap();
    dir
}

fn grade(root: &Path) -> GradingSession {
    let suite = SuiteConfig::load_from_file(root.join("suite.json")).unwrap();
    let runner = SubprocessRunner::new(suite.harness.clone());
    let mut session =
        GradingSession::new(suite.costs, suite.gap_marker, suite.policy.build().unwrap()).unwrap();
    for case in suite.test_cases().unwrap() {
        session.grade(&case, &runner).unwrap();
    }
    session
}

#[test]
fn suite_from_disk_is_scored_per_test() {
    let dir = write_suite();
    let session = grade(dir.path());

    let exact = session.report("exact").unwrap();
    assert_eq!(exact.outcome, RunOutcome::Success);
    assert!(exact.passed);
    assert_eq!(exact.score, 3.0);
    assert_eq!(exact.sections.len(), 2);

    let wrong = session.report("wrong_sum").unwrap();
    assert!(!wrong.passed);
    assert_eq!(wrong.score, 2.0);
    let changes: Vec<_> = wrong.transcript().unwrap().change_blocks().collect();
    assert!(!changes.is_empty());
    assert!(changes.iter().all(|b| b.observed_offset >= "a? 2\nb? 3\nsum ".len()));

    let missing = session.report("missing_file").unwrap();
    assert_eq!(missing.outcome, RunOutcome::Success);
    assert!(!missing.passed);
    assert_eq!(missing.score, 0.5);

    assert_eq!(session.total_max_score(), 7.0);
    assert_eq!(session.total_score(), 5.5);
}

#[test]
fn unreadable_expected_transcript_is_usage_error() {
    let dir = write_suite();
    fs::remove_file(dir.path().join("sum.expected")).unwrap();
    let suite = SuiteConfig::load_from_file(dir.path().join("suite.json")).unwrap();
    let runner = SubprocessRunner::new(suite.harness.clone());
    let mut session = GradingSession::default();

    let cases = suite.test_cases().unwrap();
    let err = session.grade(&cases[0], &runner).err().unwrap();
    assert!(err.is_usage());
    assert!(session.report("exact").is_none());
}

#[test]
fn embedded_and_subprocess_runners_agree() {
    let embedded = EmbeddedRunner::new(
        |io: &mut dyn DialogIo| {
            let a: i64 = io.input("a? ")?.trim().parse()?;
            let b: i64 = io.input("b? ")?.trim().parse()?;
            io.print(&format!("sum {}\n", a + b));
            Ok(())
        },
        Duration::from_secs(5),
    );
    let dir = write_suite();
    let subprocess = SubprocessRunner::new(gradebox::HarnessConfig {
        workdir: Some(dir.path().to_path_buf()),
        ..gradebox::HarnessConfig::with_timeouts(Duration::from_millis(200), Duration::from_secs(5))
    });

    let case = TestCase::new(
        "sum",
        "sh",
        TranscriptSource::Inline("a? 2\nb? 3\nsum 5\n".to_string()),
    )
    .with_args(["prog.sh"])
    .with_inputs(["2", "3"]);

    let mut session = GradingSession::default();
    let from_embedded = session.grade(&case, &embedded).unwrap().clone();
    let from_subprocess = session.grade(&case, &subprocess).unwrap().clone();

    assert!(from_embedded.passed);
    assert!(from_subprocess.passed);
    assert_eq!(from_embedded.score, from_subprocess.score);
    assert_eq!(session.reports().count(), 1);
}

#[test]
fn cli_diff_prints_change_records() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old.py");
    let new = dir.path().join("new.py");
    fs::write(&old, "def main():\n    pass\n").unwrap();
    fs::write(&new, "def foobar():\n    pass\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_gradebox"))
        .arg("diff")
        .arg(&old)
        .arg(&new)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "4-main\n4+foobar\n");
}

#[test]
fn cli_grade_emits_json_reports() {
    let dir = write_suite();
    let output = Command::new(env!("CARGO_BIN_EXE_gradebox"))
        .arg("grade")
        .arg("--suite")
        .arg(dir.path().join("suite.json"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0]["name"], "exact");
    assert_eq!(reports[0]["outcome"], "success");
}

#[test]
fn cli_rejects_missing_suite() {
    let output = Command::new(env!("CARGO_BIN_EXE_gradebox"))
        .arg("grade")
        .arg("--suite")
        .arg("/nonexistent/suite.json")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
