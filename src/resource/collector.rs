//! Scoped reporting of one fixture operation

use anyhow::anyhow;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::models::{Content, Details, LOG, TRACEBACK};
use crate::result::ResultSink;
use crate::utils::{LogCapture, Timer};

/// Fixture lifecycle operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FixtureOp {
    Creating,
    Destroying,
    Resetting,
}

impl fmt::Display for FixtureOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureOp::Creating => write!(f, "Creating"),
            FixtureOp::Destroying => write!(f, "Destroying"),
            FixtureOp::Resetting => write!(f, "Resetting"),
        }
    }
}

/// One operation on one fixture, as seen by a result sink
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FixtureRef {
    pub manager: String,
    pub op: FixtureOp,
}

impl FixtureRef {
    pub fn new(manager: impl Into<String>, op: FixtureOp) -> Self {
        Self {
            manager: manager.into(),
            op,
        }
    }
}

impl fmt::Display for FixtureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.manager)
    }
}

/// Wraps a single create/destroy/reset call.
///
/// The sink always receives `start_fixture`, then `add_warning` (with reason,
/// traceback and captured log) or `add_info`, then `stop_fixture`, even when
/// the operation panics. The operation's error is handed back to the caller,
/// never raised past the sink.
pub struct DetailCollector<'a> {
    fixture: FixtureRef,
    sink: &'a dyn ResultSink,
    capture: LogCapture,
}

impl<'a> DetailCollector<'a> {
    pub fn new(manager: &str, op: FixtureOp, sink: &'a dyn ResultSink) -> Self {
        Self {
            fixture: FixtureRef::new(manager, op),
            sink,
            capture: LogCapture::new(),
        }
    }

    pub fn run<T>(self, operation: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.sink.start_fixture(&self.fixture);
        let timer = Timer::start(self.fixture.to_string());

        let outcome = self
            .capture
            .in_scope(|| panic::catch_unwind(AssertUnwindSafe(operation)))
            .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(&*payload))));

        match &outcome {
            Ok(_) => {
                debug!("{} ok in {}ms", self.fixture, timer.elapsed_ms());
                self.sink.add_info(&self.fixture);
            }
            Err(err) => {
                warn!("{} failed: {err:#}", self.fixture);
                let mut details =
                    Details::reason(err.to_string()).with(TRACEBACK, Content::traceback(err));
                if !self.capture.is_empty() {
                    details.insert(LOG, Content::text(self.capture.contents()));
                }
                self.sink.add_warning(&self.fixture, details);
            }
        }

        self.sink.stop_fixture(&self.fixture);
        outcome
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResultConfig;
    use crate::result::ResultCollector;

    #[test]
    fn test_success_reports_info() {
        let sink = ResultCollector::new(ResultConfig::quiet());
        let value = DetailCollector::new("ResourceA", FixtureOp::Creating, &sink)
            .run(|| Ok(7))
            .unwrap();
        assert_eq!(value, 7);

        let result = sink.snapshot();
        assert_eq!(result.fixtures, 1);
        assert_eq!(result.infos.len(), 1);
        assert_eq!(result.infos[0].fixture, "Creating ResourceA");
        assert!(result.warnings.is_empty());
        assert!(result.timings["Creating ResourceA"].stopped_at.is_some());
    }

    #[test]
    fn test_failure_reports_warning_with_log() {
        let sink = ResultCollector::new(ResultConfig::quiet());
        let outcome: anyhow::Result<()> =
            DetailCollector::new("CreateFail", FixtureOp::Creating, &sink).run(|| {
                tracing::info!("making walla walla");
                anyhow::bail!("walla walla")
            });
        assert!(outcome.is_err());

        let result = sink.snapshot();
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.reason.as_deref(), Some("walla walla"));
        assert!(warning.details.get(LOG).unwrap().as_text().contains("making walla walla"));
        assert_eq!(result.reasons.get("walla walla"), Some(&1));
    }

    #[test]
    fn test_panic_is_contained() {
        let sink = ResultCollector::new(ResultConfig::quiet());
        let outcome: anyhow::Result<()> =
            DetailCollector::new("Boom", FixtureOp::Destroying, &sink).run(|| panic!("boom"));
        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let result = sink.snapshot();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.fixtures, 1);
        assert!(result.timings["Destroying Boom"].stopped_at.is_some());
    }

    #[test]
    fn test_fixture_ref_display() {
        let fixture = FixtureRef::new("ResourceC", FixtureOp::Resetting);
        assert_eq!(fixture.to_string(), "Resetting ResourceC");
    }
}
