//! Configuration
//!
//! Harness and alignment settings, suite files, and startup validation.

pub mod suite;
pub mod types;
pub mod validator;
