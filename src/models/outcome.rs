//! Test outcome models
//!
//! Defines per-test outcomes, outcome records and fixture records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::content::Details;

/// Reason attached to every test that could not run because its fixtures failed
pub const FIXTURE_ERROR_REASON: &str = "Error handling fixtures";

/// Test execution outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Error,
    Skip,
    ExpectedFailure,
    UnexpectedSuccess,
}

impl Outcome {
    /// Progress character printed in dots mode
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Success => ".",
            Outcome::Failure => "F",
            Outcome::Error => "E",
            Outcome::Skip => "s",
            Outcome::ExpectedFailure => "x",
            Outcome::UnexpectedSuccess => "u",
        }
    }

    /// Label printed in verbose mode
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "ok",
            Outcome::Failure => "FAIL",
            Outcome::Error => "ERROR",
            Outcome::Skip => "skipped",
            Outcome::ExpectedFailure => "expected failure",
            Outcome::UnexpectedSuccess => "unexpected success",
        }
    }

    /// Failed or errored
    pub fn is_problem(&self) -> bool {
        matches!(self, Outcome::Failure | Outcome::Error)
    }

    pub fn all() -> [Outcome; 6] {
        [
            Outcome::Success,
            Outcome::Failure,
            Outcome::Error,
            Outcome::Skip,
            Outcome::ExpectedFailure,
            Outcome::UnexpectedSuccess,
        ]
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "PASS"),
            Outcome::Failure => write!(f, "FAIL"),
            Outcome::Error => write!(f, "ERROR"),
            Outcome::Skip => write!(f, "SKIP"),
            Outcome::ExpectedFailure => write!(f, "XFAIL"),
            Outcome::UnexpectedSuccess => write!(f, "XPASS"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub test_id: String,
    pub outcome: Outcome,
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Details,
    pub duration_ms: Option<u64>,
}

impl OutcomeRecord {
    pub fn new(test_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            test_id: test_id.into(),
            outcome,
            reason: None,
            details: Details::new(),
            duration_ms: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    /// Whether the test never ran because its fixtures failed
    pub fn is_fixture_error(&self) -> bool {
        self.outcome == Outcome::Error && self.reason.as_deref() == Some(FIXTURE_ERROR_REASON)
    }
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.outcome, self.test_id)?;
        if let Some(ms) = self.duration_ms {
            write!(f, " [{ms}ms]")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " - {reason}")?;
        }
        Ok(())
    }
}

/// A fixture lifecycle event that ended in a warning or an info
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    /// Operation-qualified fixture name, e.g. `Creating ResourceC`
    pub fixture: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Details,
}

impl FixtureRecord {
    pub fn new(fixture: impl Into<String>) -> Self {
        Self {
            fixture: fixture.into(),
            reason: None,
            details: Details::new(),
        }
    }
}

/// Start/stop timestamps of a test or fixture operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Timing {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            stopped_at: None,
        }
    }

    pub fn stop(&mut self) {
        self.stopped_at = Some(Utc::now());
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.stopped_at
            .map(|end| (end - self.started_at).num_microseconds().unwrap_or(0) as f64 / 1e6)
    }
}
