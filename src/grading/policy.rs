/// Scoring policies
///
/// A policy turns one compared section into a credit fraction in `[0, 1]`;
/// the session scales it by the test's point weight.
use crate::align::{Alignment, BlockKind, DiffBlock};
use crate::config::types::{CostParams, GradeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

/// Everything a policy may look at for one section
pub struct Comparison<'a> {
    pub observed: &'a str,
    pub expected: &'a str,
    pub alignment: &'a Alignment<char>,
    pub blocks: &'a [DiffBlock],
    pub costs: &'a CostParams,
}

pub trait ScoringPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Credit fraction in `[0, 1]`
    fn credit(&self, comparison: &Comparison<'_>) -> f64;

    /// Per-region breakdown of `credit`; empty for policies without regions
    fn regions(&self, _comparison: &Comparison<'_>) -> Vec<RegionCredit> {
        Vec::new()
    }
}

/// Equal share per expected line; a line earns its share when no change touches it
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCreditPolicy;

/// Character spans `[start, end)` of each expected line, terminator included
fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut len = 0;
    for (i, c) in text.chars().enumerate() {
        len = i + 1;
        if c == '\n' {
            spans.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < len {
        spans.push((start, len));
    }
    spans
}

fn touches(span: (usize, usize), block: &DiffBlock, expected_len: usize, is_last: bool) -> bool {
    let offset = block.expected_offset;
    match block.kind {
        BlockKind::Match => false,
        BlockKind::DeletionOnly => offset < span.1 && offset + block.len() > span.0,
        BlockKind::InsertionOnly => {
            (span.0 <= offset && offset < span.1) || (is_last && offset == expected_len)
        }
    }
}

impl ScoringPolicy for LineCreditPolicy {
    fn name(&self) -> &'static str {
        "line_credit"
    }

    fn credit(&self, comparison: &Comparison<'_>) -> f64 {
        let spans = line_spans(comparison.expected);
        if spans.is_empty() {
            return if comparison.observed.is_empty() { 1.0 } else { 0.0 };
        }

        let expected_len = comparison.expected.chars().count();
        let last = spans.len() - 1;
        let intact = spans
            .iter()
            .enumerate()
            .filter(|(i, span)| {
                !comparison
                    .blocks
                    .iter()
                    .any(|b| touches(**span, b, expected_len, *i == last))
            })
            .count();

        intact as f64 / spans.len() as f64
    }
}

/// All or nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatchPolicy;

impl ScoringPolicy for ExactMatchPolicy {
    fn name(&self) -> &'static str {
        "exact_match"
    }

    fn credit(&self, comparison: &Comparison<'_>) -> f64 {
        if comparison.observed == comparison.expected {
            1.0
        } else {
            0.0
        }
    }
}

/// `1 - cost / (gap * (|observed| + |expected|))`
#[derive(Debug, Default, Clone, Copy)]
pub struct SimilarityPolicy;

impl ScoringPolicy for SimilarityPolicy {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn credit(&self, comparison: &Comparison<'_>) -> f64 {
        let symbols = comparison.observed.chars().count() + comparison.expected.chars().count();
        let worst = u64::from(comparison.costs.gap) * symbols as u64;
        if worst == 0 {
            return if comparison.alignment.cost() == 0 { 1.0 } else { 0.0 };
        }
        (1.0 - comparison.alignment.cost() as f64 / worst as f64).clamp(0.0, 1.0)
    }
}

/// Named span `[start, end)` of the expected text, in characters, worth `points`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRegion {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub points: f64,
}

impl WeightedRegion {
    pub fn new(name: impl Into<String>, span: Range<usize>, points: f64) -> Self {
        Self {
            name: name.into(),
            start: span.start,
            end: span.end,
            points,
        }
    }

    /// Region covering lines `lines` (0-based, terminators included) of `expected`
    pub fn for_lines(
        name: impl Into<String>,
        expected: &str,
        lines: Range<usize>,
        points: f64,
    ) -> Option<Self> {
        let spans = line_spans(expected);
        if lines.is_empty() || lines.end > spans.len() {
            return None;
        }
        Some(Self::new(name, spans[lines.start].0..spans[lines.end - 1].1, points))
    }
}

/// Credit of one weighted region in one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCredit {
    pub name: String,
    /// 1.0 when no change touches the region, else 0.0
    pub credit: f64,
    pub points: f64,
}

/// Partial credit by caller-supplied weighted regions of the expected text.
///
/// A region earns its points when no change block touches it; text outside
/// every region earns nothing.
#[derive(Debug, Clone)]
pub struct RegionWeightedPolicy {
    regions: Vec<WeightedRegion>,
    total_points: f64,
}

impl RegionWeightedPolicy {
    pub fn new(regions: Vec<WeightedRegion>) -> Result<Self> {
        if regions.is_empty() {
            return Err(GradeError::Usage(
                "region_weighted policy needs at least one region".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for region in &regions {
            if region.name.is_empty() || !names.insert(region.name.as_str()) {
                return Err(GradeError::Usage(format!(
                    "region names must be unique and non-empty, got {:?}",
                    region.name
                )));
            }
            if region.start >= region.end {
                return Err(GradeError::Usage(format!(
                    "region {}: empty span {}..{}",
                    region.name, region.start, region.end
                )));
            }
            if !region.points.is_finite() || region.points < 0.0 {
                return Err(GradeError::Usage(format!(
                    "region {}: points must be a non-negative number, got {}",
                    region.name, region.points
                )));
            }
        }

        let total_points: f64 = regions.iter().map(|r| r.points).sum();
        if total_points <= 0.0 {
            return Err(GradeError::Usage("regions carry no points".to_string()));
        }
        Ok(Self {
            regions,
            total_points,
        })
    }

    pub fn weighted_regions(&self) -> &[WeightedRegion] {
        &self.regions
    }

    fn region_credit(&self, region: &WeightedRegion, comparison: &Comparison<'_>) -> f64 {
        let expected_len = comparison.expected.chars().count();
        if region.end > expected_len {
            log::warn!(
                "region {} ({}..{}) extends past the expected text ({} chars)",
                region.name,
                region.start,
                region.end,
                expected_len
            );
            return 0.0;
        }
        let span = (region.start, region.end);
        let at_end = region.end == expected_len;
        if comparison
            .blocks
            .iter()
            .any(|b| touches(span, b, expected_len, at_end))
        {
            0.0
        } else {
            1.0
        }
    }
}

impl ScoringPolicy for RegionWeightedPolicy {
    fn name(&self) -> &'static str {
        "region_weighted"
    }

    fn credit(&self, comparison: &Comparison<'_>) -> f64 {
        let earned: f64 = self
            .regions(comparison)
            .iter()
            .map(|r| r.credit * r.points)
            .sum();
        earned / self.total_points
    }

    fn regions(&self, comparison: &Comparison<'_>) -> Vec<RegionCredit> {
        self.regions
            .iter()
            .map(|region| RegionCredit {
                name: region.name.clone(),
                credit: self.region_credit(region, comparison),
                points: region.points,
            })
            .collect()
    }
}

/// Policy selector for suite files
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    LineCredit,
    ExactMatch,
    Similarity,
    RegionWeighted { regions: Vec<WeightedRegion> },
}

impl PolicyKind {
    pub fn build(&self) -> Result<Box<dyn ScoringPolicy>> {
        Ok(match self {
            PolicyKind::LineCredit => Box::new(LineCreditPolicy),
            PolicyKind::ExactMatch => Box::new(ExactMatchPolicy),
            PolicyKind::Similarity => Box::new(SimilarityPolicy),
            PolicyKind::RegionWeighted { regions } => {
                Box::new(RegionWeightedPolicy::new(regions.clone())?)
            }
        })
    }
}
