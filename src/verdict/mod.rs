//! Run outcome classification
//!
//! Derives the coarse outcome of a run as a pure function of its diagnostic.

pub mod verdict;

pub use verdict::{OutcomeClassifier, RunOutcome, INPUT_EXHAUSTED_MESSAGE, TIMEOUT_MESSAGE};
