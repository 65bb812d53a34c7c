//! Grading
//!
//! Test cases, scoring policies and the session that records one
//! [`GradeReport`] per graded test.

pub mod case;
pub mod policy;
pub mod session;

pub use case::{ExpectedFile, TestCase, TranscriptSource};
pub use policy::{
    Comparison, ExactMatchPolicy, LineCreditPolicy, PolicyKind, RegionCredit, RegionWeightedPolicy,
    ScoringPolicy, SimilarityPolicy, WeightedRegion,
};
pub use session::{GradeReport, GradingSession, GroupReport, SectionReport};
