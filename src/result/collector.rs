//! In-memory result sink with console progress output

use chrono::Utc;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use super::sink::ResultSink;
use crate::config::{ResultConfig, Verbosity};
use crate::models::{
    Details, FixtureRecord, Outcome, OutcomeRecord, RunResult, Timing, FIXTURE_ERROR_REASON,
};
use crate::output::{format_error_lists, format_summary, SEPARATOR1, SEPARATOR2};
use crate::resource::FixtureRef;

/// What the collector prints while the run progresses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputMode {
    /// One line per test and fixture operation
    pub show_all: bool,
    /// One character per test and fixture operation
    pub dots: bool,
    /// Print details right after the test or fixture they belong to
    pub early_details: bool,
    /// Append the elapsed time to each line (`show_all` only)
    pub timings: bool,
}

impl OutputMode {
    /// Parallel runs interleave output, so they never print full lines or
    /// early details. Early details imply full lines.
    pub fn from_config(config: &ResultConfig) -> Self {
        let mut mode = if config.parallel {
            OutputMode {
                show_all: false,
                dots: config.verbosity != Verbosity::Quiet,
                early_details: false,
                timings: false,
            }
        } else {
            OutputMode {
                show_all: config.verbosity > Verbosity::Dots,
                dots: config.verbosity == Verbosity::Dots,
                early_details: config.early_details,
                timings: config.verbosity > Verbosity::Dots,
            }
        };
        if mode.early_details {
            mode.show_all = true;
            mode.dots = false;
            mode.timings = true;
        }
        mode
    }

    pub fn is_silent(&self) -> bool {
        !self.show_all && !self.dots
    }
}

#[derive(Default)]
struct CollectorState {
    result: RunResult,
    /// Details waiting to be printed at the next stop (early details mode)
    pending_detail: Option<String>,
}

/// Records every event of a run into a [`RunResult`].
///
/// Progress goes to stderr unless the verbosity is quiet. `should_stop`
/// turns true on the first failure or error with `failfast`, or once fixture
/// errors reach `fail_percent` of the registered tests.
pub struct ResultCollector {
    config: ResultConfig,
    mode: OutputMode,
    state: Mutex<CollectorState>,
    stream: Mutex<Option<Box<dyn Write + Send>>>,
    registered: AtomicUsize,
    stop_requested: AtomicBool,
}

impl ResultCollector {
    pub fn new(config: ResultConfig) -> Self {
        let mode = OutputMode::from_config(&config);
        let stream: Option<Box<dyn Write + Send>> = if mode.is_silent() {
            None
        } else {
            Some(Box::new(io::stderr()))
        };
        Self {
            config,
            mode,
            state: Mutex::new(CollectorState::default()),
            stream: Mutex::new(stream),
            registered: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Send progress output to `stream` instead of stderr
    pub fn with_stream(self, stream: impl Write + Send + 'static) -> Self {
        *self.stream.lock() = Some(Box::new(stream));
        self
    }

    pub fn config(&self) -> &ResultConfig {
        &self.config
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> RunResult {
        self.state.lock().result.clone()
    }

    pub fn into_result(self) -> RunResult {
        self.state.into_inner().result
    }

    pub fn was_successful(&self) -> bool {
        self.state
            .lock()
            .result
            .was_successful(self.config.uxsuccess_not_failure)
    }

    /// Fold a worker's result into this one. In dots mode the worker's
    /// fixture operations and outcomes are printed as they arrive.
    pub fn merge(&self, other: RunResult) {
        if self.mode.dots {
            let mut progress = ",".repeat(other.infos.len());
            progress.push_str(&"w".repeat(other.warnings.len()));
            for record in &other.records {
                progress.push_str(record.outcome.symbol());
            }
            self.write(&progress);
        }
        self.state.lock().result.merge(other);
    }

    /// Raise the stop flag from outside
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn write(&self, text: &str) {
        if let Some(stream) = self.stream.lock().as_mut() {
            let _ = stream.write_all(text.as_bytes());
            let _ = stream.flush();
        }
    }

    fn writeln(&self, text: &str) {
        self.write(&format!("{text}\n"));
    }

    fn record_outcome(&self, test_id: &str, outcome: Outcome, mut details: Details) {
        let reason = match outcome {
            Outcome::Failure | Outcome::Error => details.take_reason(),
            Outcome::Skip => Some(
                details
                    .take_reason()
                    .unwrap_or_else(|| "No reason given".to_string()),
            ),
            _ => None,
        };

        if self.mode.show_all {
            match &reason {
                Some(reason) => self.write(&format!("{} {reason} ", outcome.label())),
                None => self.write(outcome.label()),
            }
        } else if self.mode.dots {
            self.write(outcome.symbol());
        }

        let fixture_error_share = {
            let mut state = self.state.lock();
            if outcome.is_problem() {
                if let Some(reason) = &reason {
                    state.result.count_reason(reason);
                }
                if self.mode.early_details && !details.is_empty() {
                    state.pending_detail = Some(details.to_display_string());
                }
            }

            let mut record = OutcomeRecord::new(test_id, outcome).with_details(details);
            record.reason = reason;
            state.result.records.push(record);

            let base = self
                .registered
                .load(Ordering::SeqCst)
                .max(state.result.tests_run)
                .max(1);
            state.result.fixture_errors() as f64 * 100.0 / base as f64
        };

        if outcome.is_problem() && self.config.failfast {
            debug!("failfast: stopping after {test_id}");
            self.request_stop();
        }
        if let Some(percent) = self.config.fail_percent {
            if fixture_error_share >= percent {
                warn!(
                    "Fixture errors reached {fixture_error_share:.1}% of tests (limit {percent}%), stopping"
                );
                self.request_stop();
            }
        }
    }

    fn flush_pending_detail(&self) {
        if !self.mode.early_details {
            return;
        }
        let pending = self.state.lock().pending_detail.take();
        if let Some(detail) = pending {
            self.writeln(SEPARATOR1);
            self.writeln(&detail);
            self.writeln(SEPARATOR2);
        }
    }

    fn write_failing_file(&self, result: &RunResult) {
        let Some(path) = &self.config.failing_file else {
            return;
        };
        let mut content = result.problem_ids().join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        match std::fs::write(path, content) {
            Ok(()) => debug!("Wrote failing tests to {}", path.display()),
            Err(e) => warn!("Failed to write failing file {}: {e}", path.display()),
        }
    }
}

impl ResultSink for ResultCollector {
    fn start_test_run(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.state.lock().result.started_at = Some(Utc::now());
        if !self.mode.is_silent() {
            self.writeln(SEPARATOR2);
        }
    }

    fn stop_test_run(&self, aborted: bool) {
        let result = {
            let mut state = self.state.lock();
            state.result.stopped_at = Some(Utc::now());
            state.result.aborted |= aborted;
            state.result.clone()
        };

        self.write_failing_file(&result);

        if !self.mode.is_silent() {
            self.writeln("");
            if !self.mode.early_details {
                self.write(&format_error_lists(&result));
            }
            self.writeln(&format_summary(&result, self.config.uxsuccess_not_failure));
        }

        info!(
            "Run finished: {} ({} fixture operations, {} warnings)",
            result.counts(),
            result.fixtures,
            result.warnings.len()
        );
    }

    fn register_tests(&self, test_ids: &[String]) {
        self.registered.fetch_add(test_ids.len(), Ordering::SeqCst);
    }

    fn start_test(&self, test_id: &str) {
        {
            let mut state = self.state.lock();
            state.result.tests_run += 1;
            state.result.timings.insert(test_id.to_string(), Timing::start());
        }
        if self.mode.show_all {
            self.write(&format!("{test_id} ... "));
        }
    }

    fn stop_test(&self, test_id: &str) {
        let elapsed = {
            let mut state = self.state.lock();
            let result = &mut state.result;
            let elapsed = result.timings.get_mut(test_id).and_then(|timing| {
                timing.stop();
                timing.elapsed_secs()
            });
            if let Some(secs) = elapsed {
                if let Some(record) = result.records.iter_mut().rev().find(|r| r.test_id == test_id)
                {
                    record.duration_ms = Some((secs * 1000.0) as u64);
                }
            }
            elapsed
        };

        if self.mode.show_all {
            match elapsed {
                Some(secs) if self.mode.timings => self.writeln(&format!(" in {secs:.3}")),
                _ => self.writeln(""),
            }
        }
        self.flush_pending_detail();
    }

    fn add_success(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::Success, details);
    }

    fn add_failure(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::Failure, details);
    }

    fn add_error(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::Error, details);
    }

    fn add_skip(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::Skip, details);
    }

    fn add_expected_failure(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::ExpectedFailure, details);
    }

    fn add_unexpected_success(&self, test_id: &str, details: Details) {
        self.record_outcome(test_id, Outcome::UnexpectedSuccess, details);
    }

    fn start_fixture(&self, fixture: &FixtureRef) {
        {
            let mut state = self.state.lock();
            state.result.fixtures += 1;
            state.result.timings.insert(fixture.to_string(), Timing::start());
        }
        if self.mode.show_all {
            self.write(&format!("{fixture} ... "));
        }
    }

    fn stop_fixture(&self, fixture: &FixtureRef) {
        let elapsed = {
            let mut state = self.state.lock();
            state.result.timings.get_mut(&fixture.to_string()).and_then(|timing| {
                timing.stop();
                timing.elapsed_secs()
            })
        };
        if self.mode.show_all {
            match elapsed {
                Some(secs) if self.mode.timings => self.writeln(&format!(" in {secs:.3}")),
                _ => self.writeln(""),
            }
        }
        self.flush_pending_detail();
    }

    fn add_warning(&self, fixture: &FixtureRef, mut details: Details) {
        let reason = details.take_reason();
        if self.mode.show_all {
            match &reason {
                Some(reason) => self.write(&format!("warning {reason} ")),
                None => self.write("warning"),
            }
        } else if self.mode.dots {
            self.write("w");
        }

        let mut state = self.state.lock();
        if let Some(reason) = &reason {
            state.result.count_reason(reason);
        }
        if self.mode.early_details && !details.is_empty() {
            state.pending_detail = Some(details.to_display_string());
        }
        let mut record = FixtureRecord::new(fixture.to_string());
        record.reason = reason;
        record.details = details;
        state.result.warnings.push(record);
    }

    fn add_info(&self, fixture: &FixtureRef) {
        if self.mode.show_all {
            self.write("ok");
        } else if self.mode.dots {
            self.write(",");
        }
        self.state
            .lock()
            .result
            .infos
            .push(FixtureRecord::new(fixture.to_string()));
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}
