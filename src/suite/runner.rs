//! Error-tolerant suite execution
//!
//! The runner walks scheduled groups, switching the live resource set before
//! each one. A failed switch never escapes: every test of the affected group
//! is reported as an error with reason "Error handling fixtures" and the run
//! moves on to the next group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::case::TestRef;
use crate::config::SuiteConfig;
use crate::models::{Content, Details, FIXTURE_ERROR_REASON};
use crate::resource::{FixtureError, ResourceSet};
use crate::result::ResultSink;
use crate::scheduler::{partition, sort_tests, Bucket, ScheduledGroup};

/// Run-wide cancellation flag shared by every worker
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives groups against one sink, owning the set of managers it holds
pub struct SuiteRunner {
    held: ResourceSet,
    stop: StopSignal,
}

impl SuiteRunner {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            held: ResourceSet::new(),
            stop,
        }
    }

    /// Managers currently held by this runner
    pub fn held(&self) -> &ResourceSet {
        &self.held
    }

    /// Release what `needed` lacks, then acquire what is missing in
    /// dependency order. Stops at the first failed acquire; everything
    /// acquired so far stays held.
    pub fn switch(&mut self, needed: &ResourceSet, sink: &dyn ResultSink) -> Result<(), FixtureError> {
        let outgoing = self.held.difference(needed);
        for manager in outgoing.iter().rev() {
            debug!("Switch: releasing {}", manager.name());
            manager.release(sink);
            self.held.remove(manager.id());
        }

        let incoming = needed.difference(&self.held);
        for manager in incoming.iter() {
            debug!("Switch: acquiring {}", manager.name());
            manager.acquire(sink)?;
            self.held.insert(manager.clone());
        }
        Ok(())
    }

    /// Run `groups` in order, then drain. Returns `true` when a stop
    /// condition cut the run short.
    pub fn run_groups(&mut self, groups: &[ScheduledGroup], sink: &dyn ResultSink) -> bool {
        let aborted = self.run_until_stopped(groups, sink);
        self.drain(sink);
        aborted
    }

    fn run_until_stopped(&mut self, groups: &[ScheduledGroup], sink: &dyn ResultSink) -> bool {
        for group in groups {
            if self.should_stop(sink) {
                return true;
            }

            if let Err(err) = self.switch(&group.resources, sink) {
                warn!(
                    "Fixture {} failed, erroring {} tests: {err}",
                    err.root_manager(),
                    group.tests.len()
                );
                for test in &group.tests {
                    if self.should_stop(sink) {
                        return true;
                    }
                    report_fixture_error(test, &err, sink);
                }
                continue;
            }

            for test in &group.tests {
                if self.should_stop(sink) {
                    return true;
                }
                test.run(sink);
            }
        }
        false
    }

    /// Release everything still held. Teardown failures were already
    /// reported by the managers.
    pub fn drain(&mut self, sink: &dyn ResultSink) {
        if self.held.is_empty() {
            return;
        }
        debug!("Draining {} held resources", self.held.len());
        // switching to the empty set only releases, so it cannot fail
        let _ = self.switch(&ResourceSet::new(), sink);
    }

    fn should_stop(&self, sink: &dyn ResultSink) -> bool {
        if sink.should_stop() {
            self.stop.raise();
        }
        self.stop.is_raised()
    }
}

fn report_fixture_error(test: &TestRef, err: &FixtureError, sink: &dyn ResultSink) {
    let id = test.id();
    sink.start_test(id);
    sink.add_error(
        id,
        Details::reason(FIXTURE_ERROR_REASON).with("fixture", Content::text(err.to_string())),
    );
    sink.stop_test(id);
}

/// A collection of tests run with resource-aware ordering
pub struct ErrorTolerantSuite {
    tests: Vec<TestRef>,
    config: SuiteConfig,
}

impl ErrorTolerantSuite {
    pub fn new(config: SuiteConfig) -> Self {
        Self {
            tests: Vec::new(),
            config,
        }
    }

    pub fn with_tests(mut self, tests: impl IntoIterator<Item = TestRef>) -> Self {
        self.tests.extend(tests);
        self
    }

    pub fn add_test(&mut self, test: TestRef) {
        self.tests.push(test);
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn tests(&self) -> &[TestRef] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Ids of every test, in insertion order
    pub fn list(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.id().to_string()).collect()
    }

    /// Keep only tests whose id is in `ids`
    pub fn filter_by_ids(mut self, ids: &[String]) -> Self {
        self.tests.retain(|t| ids.iter().any(|id| id == t.id()));
        self
    }

    /// Sequential schedule
    pub fn schedule(&self) -> Vec<ScheduledGroup> {
        sort_tests(&self.tests)
    }

    /// Worker buckets for the configured concurrency
    pub fn buckets(&self) -> Vec<Bucket> {
        partition(&self.tests, self.config.concurrency)
    }

    /// Run sequentially against `sink`. Returns `true` if the run was
    /// aborted by a stop condition.
    pub fn run(&self, sink: &dyn ResultSink) -> bool {
        sink.register_tests(&self.list());
        let groups = self.schedule();
        info!("Running {} tests in {} groups", self.tests.len(), groups.len());
        SuiteRunner::new(StopSignal::new()).run_groups(&groups, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResultConfig;
    use crate::models::Outcome;
    use crate::resource::{FnFixture, Handle, ResourceManager};
    use crate::result::ResultCollector;
    use crate::suite::{FunctionTest, TestOutcome};

    fn ok_manager(name: &str) -> Arc<ResourceManager> {
        ResourceManager::builder(name, FnFixture::new(|_| Ok(Arc::new(()) as Handle))).build()
    }

    fn ok_test(id: &str, managers: &[&Arc<ResourceManager>]) -> TestRef {
        let mut test = FunctionTest::new(id, |_| TestOutcome::Success);
        for m in managers {
            test = test.with_resource(m.name(), m);
        }
        test.into_ref()
    }

    #[test]
    fn test_switch_tracks_held_set() {
        let a = ok_manager("A");
        let b = ok_manager("B");
        let sink = ResultCollector::new(ResultConfig::quiet());
        let mut runner = SuiteRunner::new(StopSignal::new());

        let ab: ResourceSet = [a.clone(), b.clone()].into_iter().collect();
        runner.switch(&ab, &sink).unwrap();
        assert_eq!(runner.held().len(), 2);
        assert_eq!(a.uses(), 1);

        let only_a: ResourceSet = [a.clone()].into_iter().collect();
        runner.switch(&only_a, &sink).unwrap();
        assert_eq!(b.uses(), 0);
        assert_eq!(a.uses(), 1);

        runner.drain(&sink);
        assert!(runner.held().is_empty());
        assert_eq!(a.uses(), 0);
    }

    #[test]
    fn test_failed_switch_errors_whole_group() {
        let broken = ResourceManager::builder(
            "Broken",
            FnFixture::new(|_| anyhow::bail!("walla walla")),
        )
        .build();
        let a = ok_manager("A");
        let suite = ErrorTolerantSuite::new(SuiteConfig::sequential()).with_tests([
            ok_test("broken.one", &[&broken]),
            ok_test("fine", &[&a]),
            ok_test("broken.two", &[&broken]),
        ]);

        let sink = ResultCollector::new(ResultConfig::quiet());
        assert!(!suite.run(&sink));

        let result = sink.snapshot();
        assert_eq!(result.tests_run, 3);
        assert_eq!(result.fixture_errors(), 2);
        assert_eq!(result.warnings.len(), 1);
        let fine = result.records.iter().find(|r| r.test_id == "fine").unwrap();
        assert_eq!(fine.outcome, Outcome::Success);
        assert_eq!(a.uses(), 0);
    }

    #[test]
    fn test_stop_signal_aborts_and_drains() {
        let a = ok_manager("A");
        let failing = FunctionTest::new("first", |_| TestOutcome::Failure("no".into()))
            .with_resource("A", &a)
            .into_ref();
        let suite = ErrorTolerantSuite::new(SuiteConfig::sequential())
            .with_tests([failing, ok_test("second", &[&a])]);

        let sink = ResultCollector::new(ResultConfig::quiet().failfast(true));
        assert!(suite.run(&sink));

        let result = sink.snapshot();
        assert_eq!(result.tests_run, 1);
        assert_eq!(a.uses(), 0);
        assert!(result.infos.iter().any(|i| i.fixture == "Destroying A"));
    }

    #[test]
    fn test_shared_signal_stops_other_runners() {
        let signal = StopSignal::new();
        signal.raise();
        let mut runner = SuiteRunner::new(signal);
        let sink = ResultCollector::new(ResultConfig::quiet());
        let groups = sort_tests(&[ok_test("never", &[])]);
        assert!(runner.run_groups(&groups, &sink));
        assert_eq!(sink.snapshot().tests_run, 0);
    }

    #[test]
    fn test_list_and_filter() {
        let suite = ErrorTolerantSuite::new(SuiteConfig::sequential())
            .with_tests([ok_test("a", &[]), ok_test("b", &[]), ok_test("c", &[])]);
        assert_eq!(suite.list(), vec!["a", "b", "c"]);

        let filtered = suite.filter_by_ids(&["c".to_string(), "a".to_string()]);
        assert_eq!(filtered.list(), vec!["a", "c"]);
    }
}
