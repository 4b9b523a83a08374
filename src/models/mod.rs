//! Data models for test runs
//!
//! This module contains the plain data exchanged between the suite runner,
//! result sinks and parallel workers.

mod content;
mod outcome;
mod run_result;

pub use content::{Content, Details, LOG, REASON, TRACEBACK};
pub use outcome::{FixtureRecord, Outcome, OutcomeRecord, Timing, FIXTURE_ERROR_REASON};
pub use run_result::{RunCounts, RunResult};
