//! Fixture Runner
//!
//! An error-tolerant test runner for suites whose tests share expensive,
//! dependency-ordered fixtures.
//!
//! ## Features
//!
//! - Reference-counted resource managers with dependencies and dirty tracking
//! - Fixture failures reported as warnings instead of aborting the run
//! - Tests grouped by the fixtures they need and ordered to minimise setups
//! - Parallel buckets with mergeable per-worker results
//! - Quiet, dots, reason-only and verbose progress output
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fixture_runner::config::{ResultConfig, SuiteConfig};
//! use fixture_runner::executor::TestRunner;
//! use fixture_runner::resource::{FnFixture, Handle, ResourceManager};
//! use fixture_runner::suite::{ErrorTolerantSuite, FunctionTest, TestOutcome};
//!
//! let db = ResourceManager::builder("Database", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
//!     .setup_cost(5)
//!     .build();
//! let suite = ErrorTolerantSuite::new(SuiteConfig::sequential()).with_tests([
//!     FunctionTest::new("db.test_query", |_| TestOutcome::Success)
//!         .with_resource("db", &db)
//!         .into_ref(),
//! ]);
//! let result = TestRunner::new(ResultConfig::default(), SuiteConfig::sequential())
//!     .run_sequential(&suite);
//! assert!(result.was_successful(false));
//! ```

pub mod cli;
pub mod config;
pub mod demo;
pub mod executor;
pub mod models;
pub mod output;
pub mod resource;
pub mod result;
pub mod results;
pub mod scheduler;
pub mod suite;
pub mod utils;
