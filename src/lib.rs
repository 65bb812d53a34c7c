//! gradebox: scripted-dialog grading for interactive programs
//! Runs a program against prerecorded inputs, captures the transcript under
//! timeout constraints and scores it against an expected transcript by
//! sequence alignment.
//!
//! # Architecture
//!
//! ## Alignment ([`align`])
//! - [`align::engine`]: Optimal alignment under gap and substitution costs
//! - [`align::grouping`]: Change blocks, partial-credit regions and diff records
//!
//! ## Dialog Harness ([`harness`])
//! - [`harness::supervisor`]: Subprocess runner (quiescence-driven input, finish timeout, group kill)
//! - [`harness::session`]: One child process with its pipes and capture buffers
//! - [`harness::output`]: Reader threads and bounded buffers
//! - [`harness::probe`]: Blocked-stdin detection from procfs
//! - [`harness::embedded`]: In-process runner with an injected console
//!
//! ## Outcome ([`verdict`])
//! - [`verdict::verdict`]: Pure classification of a run diagnostic
//!
//! ## Grading ([`grading`])
//! - [`grading::case`]: Test case values
//! - [`grading::policy`]: Scoring policies
//! - [`grading::session`]: Explicit registry of grade reports
//!
//! ## Observability ([`observability`])
//! - [`observability::events`]: Structured run lifecycle events
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Shared types, cost parameters and the error taxonomy
//! - [`config::validator`]: Startup validation
//! - [`config::suite`]: Suite file loading
//!
//! # Design Principles
//!
//! 1. **Misbehavior is data** - Hangs, crashes and extra input requests end up in the
//!    diagnostic, never in an error
//! 2. **Kernel as truth** - Input demand comes from `/proc`, exits from wait status
//! 3. **Always reap** - Every spawned child is waited for before a run returns
//! 4. **Pure core** - Alignment, grouping, scoring and classification do no I/O

// Alignment
pub mod align;

// Dialog Harness
pub mod harness;

// Outcome classification
pub mod verdict;

// Grading
pub mod grading;

// Observability
pub mod observability;

// Configuration
pub mod config;

// CLI entrypoint wiring for the gradebox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
