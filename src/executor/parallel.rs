//! Parallel test execution
//!
//! Buckets run as blocking jobs on the tokio blocking pool, bounded by a
//! semaphore. Each job produces a [`WorkerPayload`] which is absorbed into
//! the master result.

use anyhow::{bail, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::ResultConfig;
use crate::result::{AggregationError, ResultAggregator, ResultCollector, ResultSink, WorkerPayload};
use crate::scheduler::{regroup, Bucket};
use crate::suite::{StopSignal, SuiteRunner, TestRef};
use crate::utils::Timer;

/// Typed unit of work handed to a worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub worker_id: usize,
    /// Test ids in scheduled order
    pub test_ids: Vec<String>,
    pub result_config: ResultConfig,
}

impl WorkerJob {
    pub fn from_bucket(worker_id: usize, bucket: &Bucket, config: &ResultConfig) -> Self {
        Self {
            worker_id,
            test_ids: bucket.test_ids(),
            result_config: config.for_worker(),
        }
    }
}

/// Something that can run a job to completion and report back
pub trait Worker: Send + Sync {
    fn run(&self, job: WorkerJob, stop: StopSignal) -> Result<WorkerPayload>;
}

/// Runs jobs on the calling thread against a shared test registry
pub struct InProcessWorker {
    registry: HashMap<String, TestRef>,
}

impl InProcessWorker {
    pub fn new(tests: &[TestRef]) -> Self {
        Self {
            registry: tests
                .iter()
                .map(|t| (t.id().to_string(), t.clone()))
                .collect(),
        }
    }
}

impl Worker for InProcessWorker {
    fn run(&self, job: WorkerJob, stop: StopSignal) -> Result<WorkerPayload> {
        let mut tests = Vec::with_capacity(job.test_ids.len());
        for id in &job.test_ids {
            match self.registry.get(id) {
                Some(test) => tests.push(test.clone()),
                None => bail!("worker {} got unknown test id '{id}'", job.worker_id),
            }
        }

        let sink = ResultCollector::new(job.result_config);
        sink.register_tests(&job.test_ids);
        sink.start_test_run();
        let groups = regroup(&tests);
        debug!(
            "Worker {} running {} tests in {} groups",
            job.worker_id,
            tests.len(),
            groups.len()
        );
        let aborted = SuiteRunner::new(stop).run_groups(&groups, &sink);
        sink.stop_test_run(aborted);

        Ok(WorkerPayload::new(job.worker_id, sink.into_result()))
    }
}

/// Parallel bucket executor
pub struct ParallelExecutor {
    max_concurrent: usize,
}

impl ParallelExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run every job and absorb the payloads. Valid payloads are absorbed
    /// even when another worker failed; the first failure is returned.
    /// Returns whether any worker was aborted.
    pub async fn run_jobs(
        &self,
        jobs: Vec<WorkerJob>,
        worker: Arc<dyn Worker>,
        aggregator: &ResultAggregator,
        stop: StopSignal,
    ) -> std::result::Result<bool, AggregationError> {
        info!(
            "Dispatching {} jobs (max {} concurrent)",
            jobs.len(),
            self.max_concurrent
        );
        let timer = Timer::start("parallel run");
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let mut handles = Vec::new();
        for job in jobs {
            let semaphore = semaphore.clone();
            let worker = worker.clone();
            let stop = stop.clone();
            let worker_id = job.worker_id;

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AggregationError::WorkerFailed {
                        worker_id,
                        reason: e.to_string(),
                    })?;

                tokio::task::spawn_blocking(move || worker.run(job, stop))
                    .await
                    .map_err(|e| AggregationError::WorkerFailed {
                        worker_id,
                        reason: e.to_string(),
                    })?
                    .map_err(|e| AggregationError::WorkerFailed {
                        worker_id,
                        reason: format!("{e:#}"),
                    })
            });
            handles.push((worker_id, handle));
        }

        let (ids, handles): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut aborted = stop.is_raised();
        let mut first_error = None;
        for (worker_id, joined) in ids.into_iter().zip(results) {
            let outcome = joined
                .map_err(|e| AggregationError::WorkerFailed {
                    worker_id,
                    reason: e.to_string(),
                })
                .and_then(|payload| payload)
                .and_then(|payload| {
                    aborted |= payload.result.aborted;
                    aggregator.absorb(payload)
                });

            if let Err(e) = outcome {
                error!("Worker {worker_id}: {e}");
                first_error.get_or_insert(e);
            }
        }

        info!(
            "Parallel execution completed in {}ms",
            timer.stop()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(aborted),
        }
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONCURRENCY)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::models::Outcome;
    use crate::suite::{FunctionTest, TestOutcome};

    fn tests() -> Vec<TestRef> {
        vec![
            FunctionTest::new("p.ok", |_| TestOutcome::Success).into_ref(),
            FunctionTest::new("p.fail", |_| TestOutcome::Failure("nope".into())).into_ref(),
            FunctionTest::new("p.skip", |_| TestOutcome::Skip("later".into())).into_ref(),
        ]
    }

    #[test]
    fn test_parallel_executor_creation() {
        assert_eq!(ParallelExecutor::new(8).max_concurrent(), 8);
        assert_eq!(ParallelExecutor::new(0).max_concurrent(), 1);
    }

    #[test]
    fn test_job_serializes() {
        let job = WorkerJob {
            worker_id: 3,
            test_ids: vec!["a".into(), "b".into()],
            result_config: ResultConfig::default().for_worker(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: WorkerJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_in_process_worker_runs_in_order() {
        let worker = InProcessWorker::new(&tests());
        let job = WorkerJob {
            worker_id: 0,
            test_ids: vec!["p.skip".into(), "p.ok".into()],
            result_config: ResultConfig::quiet(),
        };
        let payload = worker.run(job, StopSignal::new()).unwrap();
        let ids: Vec<_> = payload.result.records.iter().map(|r| r.test_id.as_str()).collect();
        assert_eq!(ids, vec!["p.skip", "p.ok"]);
        assert_eq!(payload.counts.tests_run, 2);
    }

    #[test]
    fn test_unknown_test_id_fails_worker() {
        let worker = InProcessWorker::new(&tests());
        let job = WorkerJob {
            worker_id: 1,
            test_ids: vec!["missing".into()],
            result_config: ResultConfig::quiet(),
        };
        assert!(worker.run(job, StopSignal::new()).is_err());
    }

    #[tokio::test]
    async fn test_run_jobs_aggregates() {
        let tests = tests();
        let worker: Arc<dyn Worker> = Arc::new(InProcessWorker::new(&tests));
        let master = Arc::new(ResultCollector::new(ResultConfig::quiet()));
        let aggregator = ResultAggregator::new(master.clone());

        let jobs = vec![
            WorkerJob {
                worker_id: 0,
                test_ids: vec!["p.ok".into(), "p.fail".into()],
                result_config: ResultConfig::quiet(),
            },
            WorkerJob {
                worker_id: 1,
                test_ids: vec!["p.skip".into()],
                result_config: ResultConfig::quiet(),
            },
        ];

        let aborted = ParallelExecutor::new(2)
            .run_jobs(jobs, worker, &aggregator, StopSignal::new())
            .await
            .unwrap();
        assert!(!aborted);

        let result = master.snapshot();
        assert_eq!(result.tests_run, 3);
        assert_eq!(result.records_with(Outcome::Failure).count(), 1);
        assert_eq!(result.reasons.get("nope"), Some(&1));
    }

    #[tokio::test]
    async fn test_failed_worker_is_surfaced() {
        let tests = tests();
        let worker: Arc<dyn Worker> = Arc::new(InProcessWorker::new(&tests));
        let master = Arc::new(ResultCollector::new(ResultConfig::quiet()));
        let aggregator = ResultAggregator::new(master.clone());

        let jobs = vec![
            WorkerJob {
                worker_id: 0,
                test_ids: vec!["p.ok".into()],
                result_config: ResultConfig::quiet(),
            },
            WorkerJob {
                worker_id: 1,
                test_ids: vec!["nope".into()],
                result_config: ResultConfig::quiet(),
            },
        ];

        let err = ParallelExecutor::new(2)
            .run_jobs(jobs, worker, &aggregator, StopSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::WorkerFailed { worker_id: 1, .. }));
        assert_eq!(master.snapshot().tests_run, 1);
    }
}
