/// Grading session: explicit registry of graded tests
use crate::align::{align_text, DiffBlock, DiffGrouper};
use crate::config::types::{CostParams, Result, DEFAULT_GAP_MARKER};
use crate::config::validator::validate_costs;
use crate::grading::case::TestCase;
use crate::grading::policy::{Comparison, LineCreditPolicy, RegionCredit, ScoringPolicy};
use crate::harness::ProgramRunner;
use crate::verdict::RunOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One compared transcript or file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    pub label: String,
    pub credit: f64,
    pub cost: u64,
    pub exact: bool,
    pub observed_aligned: String,
    pub expected_aligned: String,
    pub blocks: Vec<DiffBlock>,
    /// Weighted-region breakdown, empty unless the policy defines regions
    #[serde(default)]
    pub regions: Vec<RegionCredit>,
}

impl SectionReport {
    pub fn change_blocks(&self) -> impl Iterator<Item = &DiffBlock> {
        self.blocks.iter().filter(|b| b.is_change())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
    pub outcome: RunOutcome,
    pub diagnostic: String,
    /// Transcript section first, then one per expected file
    pub sections: Vec<SectionReport>,
    /// One entry per weighted region, named `test[region]`
    #[serde(default)]
    pub groups: Vec<GroupReport>,
}

/// Score of one weighted region, in the test's points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
}

impl GradeReport {
    pub fn transcript(&self) -> Option<&SectionReport> {
        self.sections.first()
    }
}

/// Scores to four decimal places
fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Split `max_score` evenly across sections, then by region points within a section
fn group_reports(case_name: &str, max_score: f64, sections: &[SectionReport]) -> Vec<GroupReport> {
    let share = max_score / sections.len().max(1) as f64;
    let mut groups = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        let total: f64 = section.regions.iter().map(|r| r.points).sum();
        if total <= 0.0 {
            continue;
        }
        for region in &section.regions {
            let name = if index == 0 {
                format!("{}[{}]", case_name, region.name)
            } else {
                format!("{}[{}:{}]", case_name, section.label, region.name)
            };
            let max = share * region.points / total;
            groups.push(GroupReport {
                name,
                score: round_score(max * region.credit),
                max_score: round_score(max),
            });
        }
    }
    groups
}

pub struct GradingSession {
    costs: CostParams,
    gap_marker: char,
    grouper: DiffGrouper,
    policy: Box<dyn ScoringPolicy>,
    reports: BTreeMap<String, GradeReport>,
}

impl Default for GradingSession {
    fn default() -> Self {
        Self {
            costs: CostParams::default(),
            gap_marker: DEFAULT_GAP_MARKER,
            grouper: DiffGrouper::default(),
            policy: Box::new(LineCreditPolicy),
            reports: BTreeMap::new(),
        }
    }
}

impl GradingSession {
    pub fn new(costs: CostParams, gap_marker: char, policy: Box<dyn ScoringPolicy>) -> Result<Self> {
        validate_costs(&costs, gap_marker).into_result("alignment")?;
        Ok(Self {
            costs,
            gap_marker,
            policy,
            ..Self::default()
        })
    }

    pub fn with_grouper(mut self, grouper: DiffGrouper) -> Self {
        self.grouper = grouper;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Align `observed` against `expected` and score the result
    pub fn compare(&self, label: &str, observed: &str, expected: &str) -> SectionReport {
        let alignment = align_text(observed, expected, &self.costs);
        let blocks = self.grouper.group(&alignment);
        let comparison = Comparison {
            observed,
            expected,
            alignment: &alignment,
            blocks: &blocks,
            costs: &self.costs,
        };
        let credit = self.policy.credit(&comparison);
        let regions = self.policy.regions(&comparison);
        let (observed_aligned, expected_aligned) = alignment.render(self.gap_marker);

        SectionReport {
            label: label.to_string(),
            credit,
            cost: alignment.cost(),
            exact: observed == expected,
            observed_aligned,
            expected_aligned,
            blocks,
            regions,
        }
    }

    /// Run `case` with `runner`, score it and record the report under the case name
    pub fn grade(&mut self, case: &TestCase, runner: &dyn ProgramRunner) -> Result<&GradeReport> {
        case.validate()?;
        let expected = case.expected.load()?;
        let expected_files = case
            .expected_files
            .iter()
            .map(|f| f.expected.load())
            .collect::<Result<Vec<_>>>()?;

        log::info!("grading {} with {} runner", case.name, runner.name());
        let run = runner.run(&case.invocation())?;

        let mut sections = vec![self.compare("transcript", &run.transcript(), &expected)];
        for (file, expected_text) in case.expected_files.iter().zip(expected_files.iter()) {
            sections.push(self.compare(&file.label(), &file.read_observed(), expected_text));
        }

        let credit = sections.iter().map(|s| s.credit).sum::<f64>() / sections.len() as f64;
        let passed = run.outcome == RunOutcome::Success && sections.iter().all(|s| s.exact);

        let report = GradeReport {
            name: case.name.clone(),
            score: round_score(credit * case.max_score),
            max_score: case.max_score,
            passed,
            outcome: run.outcome,
            diagnostic: run.diagnostic,
            groups: group_reports(&case.name, case.max_score, &sections),
            sections,
        };
        log::info!(
            "{}: {}/{} ({})",
            report.name,
            report.score,
            report.max_score,
            report.outcome
        );

        Ok(self.record(report))
    }

    /// Store a report, replacing any earlier one with the same name
    pub fn record(&mut self, report: GradeReport) -> &GradeReport {
        let name = report.name.clone();
        self.reports.insert(name.clone(), report);
        &self.reports[&name]
    }

    pub fn report(&self, name: &str) -> Option<&GradeReport> {
        self.reports.get(name)
    }

    /// Reports ordered by test name
    pub fn reports(&self) -> impl Iterator<Item = &GradeReport> {
        self.reports.values()
    }

    pub fn total_score(&self) -> f64 {
        round_score(self.reports.values().map(|r| r.score).sum())
    }

    pub fn total_max_score(&self) -> f64 {
        self.reports.values().map(|r| r.max_score).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::case::TranscriptSource;
    use crate::grading::policy::ExactMatchPolicy;
    use crate::harness::{DialogIo, EmbeddedRunner};
    use std::time::Duration;

    fn greeter() -> EmbeddedRunner {
        EmbeddedRunner::new(
            |io: &mut dyn DialogIo| {
                let name = io.input("name? ")?;
                io.print(&format!("hello {}\n", name));
                Ok(())
            },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn exact_transcript_earns_full_points() {
        let mut session = GradingSession::default();
        let case = TestCase::new(
            "greets",
            "greeter",
            TranscriptSource::Inline("name? Ada\nhello Ada\n".to_string()),
        )
        .with_inputs(["Ada"])
        .with_max_score(5.0);

        let report = session.grade(&case, &greeter()).unwrap();
        assert_eq!(report.score, 5.0);
        assert!(report.passed);
        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.transcript().unwrap().change_blocks().count(), 0);
    }

    #[test]
    fn partial_transcript_earns_line_credit() {
        let mut session = GradingSession::default();
        let case = TestCase::new(
            "greets",
            "greeter",
            TranscriptSource::Inline("name? Ada\nhello, Ada!\n".to_string()),
        )
        .with_inputs(["Ada"])
        .with_max_score(2.0);

        let report = session.grade(&case, &greeter()).unwrap();
        assert_eq!(report.score, 1.0);
        assert!(!report.passed);
        let transcript = report.transcript().unwrap();
        assert_eq!(transcript.observed_aligned.chars().count(), transcript.expected_aligned.chars().count());
        assert!(transcript.expected_aligned.contains('~') || transcript.observed_aligned.contains('~'));
    }

    #[test]
    fn exhausted_input_is_recorded_not_raised() {
        let mut session = GradingSession::default();
        let case = TestCase::new(
            "no-input",
            "greeter",
            TranscriptSource::Inline("name? Ada\nhello Ada\n".to_string()),
        );
        let report = session.grade(&case, &greeter()).unwrap();
        assert_eq!(report.outcome, RunOutcome::InputExhausted);
        assert!(report.diagnostic.contains("called more times than expected"));
        assert!(report.score < 1.0);
    }

    #[test]
    fn session_accumulates_reports_by_name() {
        let mut session = GradingSession::new(
            CostParams::default(),
            DEFAULT_GAP_MARKER,
            Box::new(ExactMatchPolicy),
        )
        .unwrap();
        for (name, expected) in [("a", "name? x\nhello x\n"), ("b", "wrong")] {
            let case = TestCase::new(name, "greeter", TranscriptSource::Inline(expected.to_string()))
                .with_inputs(["x"]);
            session.grade(&case, &greeter()).unwrap();
        }
        assert_eq!(session.reports().count(), 2);
        assert_eq!(session.report("a").unwrap().score, 1.0);
        assert_eq!(session.report("b").unwrap().score, 0.0);
        assert_eq!(session.total_score(), 1.0);
        assert_eq!(session.total_max_score(), 2.0);
    }

    #[test]
    fn newline_gap_marker_is_usage_error() {
        let err = GradingSession::new(CostParams::default(), '\n', Box::new(LineCreditPolicy))
            .err()
            .expect("must fail");
        assert!(err.is_usage());
    }

    #[test]
    fn separate_stderr_crash_text_is_graded() {
        use crate::config::types::HarnessConfig;
        use crate::harness::SubprocessRunner;

        let runner = SubprocessRunner::new(HarnessConfig {
            merge_stderr: false,
            ..HarnessConfig::with_timeouts(Duration::from_millis(200), Duration::from_secs(5))
        });
        let case = TestCase::new(
            "crashes",
            "/bin/sh",
            TranscriptSource::Inline("start\ndone\n".to_string()),
        )
        .with_args(["-c", "echo start; echo 'Traceback: boom' 1>&2; exit 1"]);

        let mut session = GradingSession::default();
        let report = session.grade(&case, &runner).unwrap();
        assert_eq!(report.outcome, RunOutcome::Crashed);
        let inserted: String = report
            .transcript()
            .unwrap()
            .change_blocks()
            .filter(|b| b.kind == crate::align::BlockKind::InsertionOnly)
            .map(|b| b.text.as_str())
            .collect();
        assert!(inserted.contains("Traceback"), "inserted text: {:?}", inserted);
    }

    #[test]
    fn weighted_regions_are_reported_as_groups() {
        use crate::grading::policy::{RegionWeightedPolicy, WeightedRegion};

        let expected = "name? Ada\nhello, Ada\n";
        let policy = RegionWeightedPolicy::new(vec![
            WeightedRegion::for_lines("prompt", expected, 0..1, 1.0).unwrap(),
            WeightedRegion::for_lines("greeting", expected, 1..2, 3.0).unwrap(),
        ])
        .unwrap();
        let mut session =
            GradingSession::new(CostParams::default(), DEFAULT_GAP_MARKER, Box::new(policy)).unwrap();
        let case = TestCase::new("greets", "greeter", TranscriptSource::Inline(expected.to_string()))
            .with_inputs(["Ada"])
            .with_max_score(8.0);

        let report = session.grade(&case, &greeter()).unwrap();
        assert_eq!(report.score, 2.0);
        assert_eq!(
            report.groups,
            vec![
                GroupReport {
                    name: "greets[prompt]".to_string(),
                    score: 2.0,
                    max_score: 2.0,
                },
                GroupReport {
                    name: "greets[greeting]".to_string(),
                    score: 0.0,
                    max_score: 6.0,
                },
            ]
        );
        let group_total: f64 = report.groups.iter().map(|g| g.score).sum();
        assert_eq!(group_total, report.score);
    }

    #[test]
    fn policies_without_regions_report_no_groups() {
        let mut session = GradingSession::default();
        let case = TestCase::new(
            "greets",
            "greeter",
            TranscriptSource::Inline("name? Ada\nhello Ada\n".to_string()),
        )
        .with_inputs(["Ada"]);
        assert!(session.grade(&case, &greeter()).unwrap().groups.is_empty());
    }

    #[test]
    fn score_rounding() {
        assert_eq!(round_score(2.0 / 3.0), 0.6667);
    }
}
