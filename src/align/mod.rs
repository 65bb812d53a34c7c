//! Sequence alignment
//!
//! Edit-distance alignment with configurable gap and substitution costs,
//! and the grouping of an alignment into contiguous change blocks.

pub mod engine;
pub mod grouping;

pub use engine::{align, align_lines, align_text, Alignment, Column};
pub use grouping::{diff_records, group_blocks, BlockKind, DiffBlock, DiffGrouper};
