use crate::align::grouping::diff_records;
use crate::align::DiffBlock;
use crate::config::suite::SuiteConfig;
use crate::config::types::CostParams;
use crate::grading::{GradeReport, GradingSession};
use crate::harness::SubprocessRunner;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test of a suite file and print the scores
    Grade {
        /// Suite file (JSON)
        #[arg(long)]
        suite: PathBuf,
        /// Print the full reports as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Include change records in the summary
        #[arg(long)]
        verbose: bool,
    },
    /// Print change records turning OLD into NEW
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Print newlines and tabs literally
        #[arg(long)]
        raw: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Grade {
            suite,
            json,
            verbose,
        } => grade_suite(&suite, json, verbose),
        Commands::Diff { old, new, raw } => diff_files(&old, &new, raw),
    }
}

fn grade_suite(path: &Path, json: bool, verbose: bool) -> Result<()> {
    let suite = SuiteConfig::load_from_file(path)?;
    let cases = suite.test_cases()?;
    let runner = SubprocessRunner::new(suite.harness.clone());
    let mut session = GradingSession::new(suite.costs, suite.gap_marker, suite.policy.build()?)?;

    log::info!(
        "grading {} test(s) from {:?} with {} policy",
        cases.len(),
        path,
        session.policy_name()
    );
    for case in &cases {
        session
            .grade(case, &runner)
            .with_context(|| format!("grading {}", case.name))?;
    }

    if json {
        let reports: Vec<&GradeReport> = session.reports().collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in session.reports() {
        print_summary(report, verbose);
    }
    println!(
        "total: {}/{}",
        session.total_score(),
        session.total_max_score()
    );
    Ok(())
}

fn print_summary(report: &GradeReport, verbose: bool) {
    let mark = if report.passed { "PASS" } else { "FAIL" };
    println!(
        "{} {}: {}/{} [{}]",
        mark, report.name, report.score, report.max_score, report.outcome
    );
    if !report.diagnostic.is_empty() {
        println!("    {}", report.diagnostic.replace('\n', "\n    "));
    }
    for group in &report.groups {
        println!("    {}: {}/{}", group.name, group.score, group.max_score);
    }
    if !verbose {
        return;
    }
    for section in &report.sections {
        let records: Vec<String> = section
            .change_blocks()
            .filter_map(DiffBlock::sanitized_record)
            .collect();
        if !records.is_empty() {
            println!("    {} ({:.2}): {}", section.label, section.credit, records.join(" "));
        }
    }
}

fn diff_files(old: &Path, new: &Path, raw: bool) -> Result<()> {
    let old_text =
        std::fs::read_to_string(old).with_context(|| format!("reading {}", old.display()))?;
    let new_text =
        std::fs::read_to_string(new).with_context(|| format!("reading {}", new.display()))?;

    for record in diff_records(&old_text, &new_text, &CostParams::default()) {
        if raw {
            println!("{}", record);
        } else {
            println!("{}", crate::align::grouping::sanitize(&record));
        }
    }
    Ok(())
}
