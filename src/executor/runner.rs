//! Test run driver
//!
//! Wraps a suite run in `start_test_run`/`stop_test_run` and picks the
//! sequential or the parallel path.

use std::sync::Arc;
use tracing::info;

use super::parallel::{InProcessWorker, ParallelExecutor, Worker, WorkerJob};
use crate::config::{AppConfig, Concurrency, ResultConfig, SuiteConfig};
use crate::models::RunResult;
use crate::result::{AggregationError, ResultAggregator, ResultCollector, ResultSink};
use crate::suite::{ErrorTolerantSuite, StopSignal};
use crate::utils::Timer;

/// Runs a suite to completion and returns the recorded result
pub struct TestRunner {
    result_config: ResultConfig,
    suite_config: SuiteConfig,
}

impl TestRunner {
    pub fn new(result_config: ResultConfig, suite_config: SuiteConfig) -> Self {
        Self {
            result_config,
            suite_config,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.result.clone(), config.suite.clone())
    }

    pub fn result_config(&self) -> &ResultConfig {
        &self.result_config
    }

    pub fn suite_config(&self) -> &SuiteConfig {
        &self.suite_config
    }

    /// Run `suite` in the configured mode
    pub async fn run(&self, suite: &ErrorTolerantSuite) -> Result<RunResult, AggregationError> {
        if self.suite_config.parallel {
            self.run_parallel(suite).await
        } else {
            Ok(self.run_sequential(suite))
        }
    }

    /// Run every test on the calling thread
    pub fn run_sequential(&self, suite: &ErrorTolerantSuite) -> RunResult {
        let sink = ResultCollector::new(self.result_config.clone());
        self.run_sequential_with(suite, &sink);
        sink.into_result()
    }

    /// Run every test on the calling thread against a caller-provided sink
    pub fn run_sequential_with(&self, suite: &ErrorTolerantSuite, sink: &dyn ResultSink) -> bool {
        info!("Starting sequential run of {} tests", suite.len());
        let timer = Timer::start("sequential run");

        sink.start_test_run();
        let aborted = suite.run(sink);
        sink.stop_test_run(aborted);

        info!(
            "Sequential run finished in {}ms{}",
            timer.stop(),
            if aborted { " (aborted)" } else { "" }
        );
        aborted
    }

    /// Partition into buckets and run them on concurrent workers
    pub async fn run_parallel(&self, suite: &ErrorTolerantSuite) -> Result<RunResult, AggregationError> {
        let worker: Arc<dyn Worker> = Arc::new(InProcessWorker::new(suite.tests()));
        self.run_parallel_with(suite, worker).await
    }

    /// Parallel run with a custom worker implementation
    pub async fn run_parallel_with(
        &self,
        suite: &ErrorTolerantSuite,
        worker: Arc<dyn Worker>,
    ) -> Result<RunResult, AggregationError> {
        let master_config = self.result_config.clone().parallel(true);
        let master = Arc::new(ResultCollector::new(master_config.clone()));
        let aggregator = ResultAggregator::new(master.clone());

        let buckets = suite.buckets();
        let concurrency = match self.suite_config.concurrency {
            Concurrency::Fixed(n) => n,
            Concurrency::Auto => buckets.len(),
        };
        info!(
            "Starting parallel run of {} tests in {} buckets",
            suite.len(),
            buckets.len()
        );

        master.register_tests(&suite.list());
        master.start_test_run();

        let jobs: Vec<WorkerJob> = buckets
            .iter()
            .enumerate()
            .map(|(i, bucket)| WorkerJob::from_bucket(i, bucket, &master_config))
            .collect();

        let outcome = ParallelExecutor::new(concurrency)
            .run_jobs(jobs, worker, &aggregator, StopSignal::new())
            .await;

        let aborted = match &outcome {
            Ok(aborted) => *aborted,
            Err(_) => true,
        };
        master.stop_test_run(aborted);
        outcome?;

        Ok(master.snapshot())
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(ResultConfig::default(), SuiteConfig::default())
    }
}
