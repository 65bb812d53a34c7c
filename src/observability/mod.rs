//! Observability
//!
//! Structured run lifecycle events for operational visibility.

pub mod events;
