//! tracelens library crate
//!
//! Exposes the diagnosis pipeline and its supporting modules so benchmarks,
//! integration tests and other hosts can run analyses without the CLI.

pub mod config;
pub mod context;
pub mod diagnose;
pub mod history;
pub mod report;
pub mod util;
