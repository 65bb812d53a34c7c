/// Change-block grouping over a character alignment
use crate::align::engine::{align_text, Alignment, Column};
use crate::config::types::CostParams;
use serde::{Deserialize, Serialize};

/// Default shortest equality kept between two change regions
pub const DEFAULT_MIN_MATCH_RUN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Match,
    /// Present in observed, absent from expected
    InsertionOnly,
    /// Expected but missing from observed
    DeletionOnly,
}

/// Contiguous run of one block kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBlock {
    pub kind: BlockKind,
    /// Start offset in the observed text, in characters
    pub observed_offset: usize,
    /// Start offset in the expected text, in characters
    pub expected_offset: usize,
    pub text: String,
}

impl DiffBlock {
    pub fn is_change(&self) -> bool {
        self.kind != BlockKind::Match
    }

    /// Length of `text` in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// `{offset}{-|+}{text}` record; `None` for match blocks
    pub fn record(&self) -> Option<String> {
        let sign = match self.kind {
            BlockKind::Match => return None,
            BlockKind::DeletionOnly => '-',
            BlockKind::InsertionOnly => '+',
        };
        Some(format!("{}{}{}", self.observed_offset, sign, self.text))
    }

    /// Same as `record` with newlines and tabs escaped
    pub fn sanitized_record(&self) -> Option<String> {
        self.record().map(|r| sanitize(&r))
    }
}

pub fn sanitize(text: &str) -> String {
    text.replace('\n', "\\n").replace('\t', "\\t")
}

/// Run of columns before blocks are emitted
#[derive(Debug)]
enum Segment {
    Equal {
        observed_offset: usize,
        expected_offset: usize,
        text: String,
    },
    Change {
        observed_offset: usize,
        expected_offset: usize,
        inserted: String,
        deleted: String,
    },
}

impl Segment {
    fn short_equal(&self, min_match_run: usize) -> bool {
        matches!(self, Segment::Equal { text, .. } if text.chars().count() < min_match_run)
    }
}

/// Partitions alignments into blocks
#[derive(Debug, Clone, Copy)]
pub struct DiffGrouper {
    /// Equalities shorter than this between two change regions are absorbed
    pub min_match_run: usize,
}

impl Default for DiffGrouper {
    fn default() -> Self {
        Self {
            min_match_run: DEFAULT_MIN_MATCH_RUN,
        }
    }
}

impl DiffGrouper {
    pub fn new(min_match_run: usize) -> Self {
        Self { min_match_run }
    }

    pub fn group(&self, alignment: &Alignment<char>) -> Vec<DiffBlock> {
        let segments = self.absorb_short_equalities(segment(alignment));
        let mut blocks = Vec::with_capacity(segments.len() * 2);

        for seg in segments {
            match seg {
                Segment::Equal {
                    observed_offset,
                    expected_offset,
                    text,
                } => blocks.push(DiffBlock {
                    kind: BlockKind::Match,
                    observed_offset,
                    expected_offset,
                    text,
                }),
                Segment::Change {
                    observed_offset,
                    expected_offset,
                    inserted,
                    deleted,
                } => {
                    if !deleted.is_empty() {
                        blocks.push(DiffBlock {
                            kind: BlockKind::DeletionOnly,
                            observed_offset,
                            expected_offset,
                            text: deleted,
                        });
                    }
                    if !inserted.is_empty() {
                        blocks.push(DiffBlock {
                            kind: BlockKind::InsertionOnly,
                            observed_offset,
                            expected_offset,
                            text: inserted,
                        });
                    }
                }
            }
        }

        blocks
    }

    fn absorb_short_equalities(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::with_capacity(segments.len());

        for seg in segments {
            let absorbs = matches!(seg, Segment::Change { .. })
                && out.len() >= 2
                && out[out.len() - 1].short_equal(self.min_match_run)
                && matches!(out[out.len() - 2], Segment::Change { .. });

            if !absorbs {
                out.push(seg);
                continue;
            }

            let equal = out.pop();
            let previous = out.pop();
            match (previous, equal, seg) {
                (
                    Some(Segment::Change {
                        observed_offset,
                        expected_offset,
                        mut inserted,
                        mut deleted,
                    }),
                    Some(Segment::Equal { text, .. }),
                    Segment::Change {
                        inserted: next_inserted,
                        deleted: next_deleted,
                        ..
                    },
                ) => {
                    inserted.push_str(&text);
                    inserted.push_str(&next_inserted);
                    deleted.push_str(&text);
                    deleted.push_str(&next_deleted);
                    out.push(Segment::Change {
                        observed_offset,
                        expected_offset,
                        inserted,
                        deleted,
                    });
                }
                _ => unreachable!("absorption requires change, equal, change"),
            }
        }

        out
    }
}

/// Split an alignment into alternating equal and change segments
fn segment(alignment: &Alignment<char>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let (mut observed_pos, mut expected_pos) = (0usize, 0usize);

    for column in alignment.columns() {
        let (inserted, deleted) = match column {
            Column::Match(c) => {
                match segments.last_mut() {
                    Some(Segment::Equal { text, .. }) => text.push(*c),
                    _ => segments.push(Segment::Equal {
                        observed_offset: observed_pos,
                        expected_offset: expected_pos,
                        text: c.to_string(),
                    }),
                }
                observed_pos += 1;
                expected_pos += 1;
                continue;
            }
            Column::Substitution(o, e) => (Some(*o), Some(*e)),
            Column::ObservedOnly(o) => (Some(*o), None),
            Column::ExpectedOnly(e) => (None, Some(*e)),
        };

        if !matches!(segments.last(), Some(Segment::Change { .. })) {
            segments.push(Segment::Change {
                observed_offset: observed_pos,
                expected_offset: expected_pos,
                inserted: String::new(),
                deleted: String::new(),
            });
        }
        if let Some(Segment::Change {
            inserted: ins,
            deleted: del,
            ..
        }) = segments.last_mut()
        {
            if let Some(c) = inserted {
                ins.push(c);
                observed_pos += 1;
            }
            if let Some(c) = deleted {
                del.push(c);
                expected_pos += 1;
            }
        }
    }

    segments
}

/// Group with the default grouper
pub fn group_blocks(alignment: &Alignment<char>) -> Vec<DiffBlock> {
    DiffGrouper::default().group(alignment)
}

/// Change records turning `old` into `new`, offsets in `new`
pub fn diff_records(old: &str, new: &str, costs: &CostParams) -> Vec<String> {
    let alignment = align_text(new, old, costs);
    group_blocks(&alignment)
        .iter()
        .filter_map(DiffBlock::record)
        .collect()
}
