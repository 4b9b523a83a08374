//! Merging of worker-local results into the master result

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use super::collector::ResultCollector;
use crate::models::{RunCounts, RunResult};

/// Structured result a worker hands back for one bucket
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub worker_id: usize,
    /// Counts as reported by the worker; must agree with `result`
    pub counts: RunCounts,
    pub result: RunResult,
}

impl WorkerPayload {
    pub fn new(worker_id: usize, result: RunResult) -> Self {
        Self {
            worker_id,
            counts: result.counts(),
            result,
        }
    }
}

/// Worker payload problems. These point at a worker or transport bug and are
/// always surfaced.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("worker {worker_id} reported {reported} but its records add up to {actual}")]
    CountMismatch {
        worker_id: usize,
        reported: RunCounts,
        actual: RunCounts,
    },

    #[error("malformed worker payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("worker {worker_id} failed: {reason}")]
    WorkerFailed { worker_id: usize, reason: String },
}

/// Folds worker payloads into one master [`ResultCollector`].
///
/// Each absorb is a single locked merge, and merging is commutative in every
/// count and in the reason histogram.
#[derive(Clone)]
pub struct ResultAggregator {
    master: Arc<ResultCollector>,
}

impl ResultAggregator {
    pub fn new(master: Arc<ResultCollector>) -> Self {
        Self { master }
    }

    pub fn master(&self) -> &Arc<ResultCollector> {
        &self.master
    }

    /// Validate and merge one worker's result
    pub fn absorb(&self, payload: WorkerPayload) -> Result<(), AggregationError> {
        let actual = payload.result.counts();
        let outcomes_match = actual.outcomes() == payload.result.records.len()
            && actual.tests_run == payload.result.records.len();
        if payload.counts != actual || !outcomes_match {
            error!(
                "Rejecting payload of worker {}: counts do not reconcile",
                payload.worker_id
            );
            return Err(AggregationError::CountMismatch {
                worker_id: payload.worker_id,
                reported: payload.counts,
                actual,
            });
        }

        debug!("Absorbing worker {}: {}", payload.worker_id, actual);
        self.master.merge(payload.result);
        Ok(())
    }

    /// Parse and merge a serialized payload
    pub fn absorb_json(&self, json: &str) -> Result<(), AggregationError> {
        let payload: WorkerPayload = serde_json::from_str(json)?;
        self.absorb(payload)
    }
}
