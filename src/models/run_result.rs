//! Aggregate result of a test run
//!
//! `RunResult` is the plain data behind a result sink. Worker-local results
//! are merged into one with [`RunResult::merge`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::outcome::{FixtureRecord, Outcome, OutcomeRecord, Timing, FIXTURE_ERROR_REASON};

/// Outcome counts of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub tests_run: usize,
    pub successes: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    pub expected_failures: usize,
    pub unexpected_successes: usize,
}

impl RunCounts {
    /// Count outcomes of `records`; `tests_run` is taken as given
    pub fn tally(tests_run: usize, records: &[OutcomeRecord]) -> Self {
        let mut counts = RunCounts {
            tests_run,
            ..Default::default()
        };
        for record in records {
            match record.outcome {
                Outcome::Success => counts.successes += 1,
                Outcome::Failure => counts.failures += 1,
                Outcome::Error => counts.errors += 1,
                Outcome::Skip => counts.skipped += 1,
                Outcome::ExpectedFailure => counts.expected_failures += 1,
                Outcome::UnexpectedSuccess => counts.unexpected_successes += 1,
            }
        }
        counts
    }

    pub fn outcomes(&self) -> usize {
        self.successes
            + self.failures
            + self.errors
            + self.skipped
            + self.expected_failures
            + self.unexpected_successes
    }

    pub fn add(&mut self, other: &RunCounts) {
        self.tests_run += other.tests_run;
        self.successes += other.successes;
        self.failures += other.failures;
        self.errors += other.errors;
        self.skipped += other.skipped;
        self.expected_failures += other.expected_failures;
        self.unexpected_successes += other.unexpected_successes;
    }
}

impl fmt::Display for RunCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run: {} | Fail: {} | Error: {} | Skip: {} | XFail: {} | XPass: {}",
            self.tests_run,
            self.failures,
            self.errors,
            self.skipped,
            self.expected_failures,
            self.unexpected_successes
        )
    }
}

/// Everything recorded during a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub tests_run: usize,
    pub records: Vec<OutcomeRecord>,
    pub warnings: Vec<FixtureRecord>,
    pub infos: Vec<FixtureRecord>,
    /// Number of fixture operations started
    pub fixtures: usize,
    pub timings: BTreeMap<String, Timing>,
    pub reasons: BTreeMap<String, usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub aborted: bool,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> RunCounts {
        RunCounts::tally(self.tests_run, &self.records)
    }

    /// Success iff no failures or errors, and unless allowed, no unexpected successes
    pub fn was_successful(&self, uxsuccess_not_failure: bool) -> bool {
        let counts = self.counts();
        let problems = counts.failures + counts.errors;
        if uxsuccess_not_failure {
            problems == 0
        } else {
            problems + counts.unexpected_successes == 0
        }
    }

    pub fn count_reason(&mut self, reason: &str) {
        *self.reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Errors synthesized because fixtures could not be set up
    pub fn fixture_errors(&self) -> usize {
        self.reasons.get(FIXTURE_ERROR_REASON).copied().unwrap_or(0)
    }

    pub fn records_with(&self, outcome: Outcome) -> impl Iterator<Item = &OutcomeRecord> {
        self.records.iter().filter(move |r| r.outcome == outcome)
    }

    /// Ids of failed and errored tests, in report order
    pub fn problem_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.outcome.is_problem())
            .map(|r| r.test_id.clone())
            .collect()
    }

    pub fn elapsed_secs(&self) -> f64 {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(end)) => {
                (end - start).num_microseconds().unwrap_or(0) as f64 / 1e6
            }
            _ => 0.0,
        }
    }

    /// Fold `other` into `self`.
    ///
    /// Counts and reasons are summed and lists concatenated, so merging any
    /// permutation of results yields the same totals. Colliding timing keys
    /// keep the earliest start.
    pub fn merge(&mut self, other: RunResult) {
        self.tests_run += other.tests_run;
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
        self.infos.extend(other.infos);
        self.fixtures += other.fixtures;

        for (key, timing) in other.timings {
            match self.timings.get(&key) {
                Some(existing) if existing.started_at <= timing.started_at => {}
                _ => {
                    self.timings.insert(key, timing);
                }
            }
        }

        for (reason, count) in other.reasons {
            *self.reasons.entry(reason).or_insert(0) += count;
        }

        self.started_at = match (self.started_at, other.started_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.stopped_at = match (self.stopped_at, other.stopped_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.aborted |= other.aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(outcomes: &[(&str, Outcome)]) -> RunResult {
        let mut result = RunResult::new();
        for (id, outcome) in outcomes {
            result.tests_run += 1;
            result.records.push(OutcomeRecord::new(*id, *outcome));
        }
        result
    }

    #[test]
    fn test_counts_reconcile() {
        let result = result_with(&[
            ("t1", Outcome::Success),
            ("t2", Outcome::Failure),
            ("t3", Outcome::Skip),
            ("t4", Outcome::Error),
        ]);
        let counts = result.counts();
        assert_eq!(counts.tests_run, 4);
        assert_eq!(counts.outcomes(), 4);
        assert_eq!(counts.failures, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_was_successful() {
        let result = result_with(&[("t1", Outcome::UnexpectedSuccess)]);
        assert!(!result.was_successful(false));
        assert!(result.was_successful(true));

        let result = result_with(&[("t1", Outcome::Success), ("t2", Outcome::Skip)]);
        assert!(result.was_successful(false));
    }

    #[test]
    fn test_merge_sums() {
        let mut a = result_with(&[("t1", Outcome::Success), ("t2", Outcome::Error)]);
        a.count_reason(FIXTURE_ERROR_REASON);
        a.fixtures = 3;
        let mut b = result_with(&[("t3", Outcome::Error)]);
        b.count_reason(FIXTURE_ERROR_REASON);
        b.fixtures = 2;
        b.aborted = true;

        a.merge(b);
        assert_eq!(a.tests_run, 3);
        assert_eq!(a.counts().errors, 2);
        assert_eq!(a.fixtures, 5);
        assert_eq!(a.fixture_errors(), 2);
        assert!(a.aborted);
        assert_eq!(a.problem_ids(), vec!["t2".to_string(), "t3".to_string()]);
    }

    #[test]
    fn test_merge_keeps_earliest_timing() {
        let early = Timing::start();
        let late = Timing {
            started_at: early.started_at + chrono::Duration::seconds(5),
            stopped_at: None,
        };
        let mut a = RunResult::new();
        a.timings.insert("Creating A".into(), late.clone());
        let mut b = RunResult::new();
        b.timings.insert("Creating A".into(), early.clone());

        a.merge(b);
        assert_eq!(a.timings["Creating A"], early);
    }
}
