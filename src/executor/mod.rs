//! Test execution engine
//!
//! Provides sequential and parallel run capabilities.

mod parallel;
mod runner;

pub use parallel::{InProcessWorker, ParallelExecutor, Worker, WorkerJob};
pub use runner::TestRunner;
