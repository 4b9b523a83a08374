//! Test cases
//!
//! A test exposes an id, the resource managers it needs and a weight, and
//! reports its own outcome to a sink when run.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

use crate::models::{Content, Details, FIXTURE_ERROR_REASON, REASON, TRACEBACK};
use crate::resource::{panic_message, Resource, ResourceManager};
use crate::result::ResultSink;

/// Shared handle to a test
pub type TestRef = Arc<dyn TestCase>;

/// Declared resources of a test: `(alias, manager)` pairs
pub type DeclaredResources = Vec<(String, Arc<ResourceManager>)>;

/// A runnable test
pub trait TestCase: Send + Sync {
    /// Dotted unique name
    fn id(&self) -> &str;

    fn resources(&self) -> &[(String, Arc<ResourceManager>)] {
        &[]
    }

    /// Weight used to bucket tests in auto concurrency mode
    fn concurrency(&self) -> u32 {
        1
    }

    /// Execute and report to `sink`, including `start_test`/`stop_test`
    fn run(&self, sink: &dyn ResultSink);
}

impl fmt::Debug for dyn TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id())
            .field("concurrency", &self.concurrency())
            .finish()
    }
}

/// What a test body decided
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestOutcome {
    Success,
    Failure(String),
    Error(String),
    Skip(String),
    ExpectedFailure(String),
    UnexpectedSuccess,
}

impl From<anyhow::Result<()>> for TestOutcome {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => TestOutcome::Success,
            Err(err) => TestOutcome::Error(format!("{err:#}")),
        }
    }
}

/// What a running test body can see and do
pub struct TestContext {
    resources: BTreeMap<String, Resource>,
    managers: BTreeMap<String, Arc<ResourceManager>>,
    details: Details,
}

impl TestContext {
    fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
            managers: BTreeMap::new(),
            details: Details::new(),
        }
    }

    pub fn resource(&self, alias: &str) -> Option<&Resource> {
        self.resources.get(alias)
    }

    /// Typed view of a resource
    pub fn get<T: Any>(&self, alias: &str) -> Option<&T> {
        self.resources.get(alias)?.downcast_ref::<T>()
    }

    /// The test changed the resource; it is reset before its next use
    pub fn mark_dirty(&self, alias: &str) {
        if let Some(manager) = self.managers.get(alias) {
            manager.mark_dirty();
        }
    }

    /// Attach a detail; a taken name gets a numeric suffix. Returns the
    /// name used.
    pub fn add_detail(&mut self, name: &str, content: Content) -> String {
        self.details.add(name, content)
    }

    pub fn details(&self) -> &Details {
        &self.details
    }
}

type Body = dyn Fn(&mut TestContext) -> TestOutcome + Send + Sync;

/// A test backed by a closure
pub struct FunctionTest {
    id: String,
    resources: DeclaredResources,
    concurrency: u32,
    body: Arc<Body>,
}

impl FunctionTest {
    pub fn new(
        id: impl Into<String>,
        body: impl Fn(&mut TestContext) -> TestOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            resources: Vec::new(),
            concurrency: 1,
            body: Arc::new(body),
        }
    }

    /// Declare a resource, visible to the body under `alias`
    pub fn with_resource(mut self, alias: impl Into<String>, manager: &Arc<ResourceManager>) -> Self {
        self.resources.push((alias.into(), manager.clone()));
        self
    }

    pub fn with_concurrency(mut self, weight: u32) -> Self {
        self.concurrency = weight;
        self
    }

    pub fn into_ref(self) -> TestRef {
        Arc::new(self)
    }

    fn report(&self, sink: &dyn ResultSink, outcome: TestOutcome, mut details: Details) {
        let id = self.id.as_str();
        match outcome {
            TestOutcome::Success => sink.add_success(id, details),
            TestOutcome::UnexpectedSuccess => sink.add_unexpected_success(id, details),
            TestOutcome::Failure(reason) => {
                details.insert(REASON, Content::text(reason));
                sink.add_failure(id, details)
            }
            TestOutcome::Error(reason) => {
                details.insert(REASON, Content::text(reason));
                sink.add_error(id, details)
            }
            TestOutcome::Skip(reason) => {
                details.insert(REASON, Content::text(reason));
                sink.add_skip(id, details)
            }
            TestOutcome::ExpectedFailure(reason) => {
                details.insert(REASON, Content::text(reason));
                sink.add_expected_failure(id, details)
            }
        }
    }
}

impl TestCase for FunctionTest {
    fn id(&self) -> &str {
        &self.id
    }

    fn resources(&self) -> &[(String, Arc<ResourceManager>)] {
        &self.resources
    }

    fn concurrency(&self) -> u32 {
        self.concurrency
    }

    fn run(&self, sink: &dyn ResultSink) {
        sink.start_test(&self.id);
        let mut context = TestContext::new();

        let mut acquired: Vec<&Arc<ResourceManager>> = Vec::new();
        let mut setup_error = None;
        for (alias, manager) in &self.resources {
            match manager.acquire(sink) {
                Ok(resource) => {
                    acquired.push(manager);
                    context.resources.insert(alias.clone(), resource);
                    context.managers.insert(alias.clone(), manager.clone());
                }
                Err(err) => {
                    setup_error = Some(err);
                    break;
                }
            }
        }

        let (outcome, details) = match setup_error {
            Some(err) => {
                debug!("{}: resource setup failed: {err}", self.id);
                (
                    TestOutcome::Error(FIXTURE_ERROR_REASON.to_string()),
                    Details::new().with("fixture", Content::text(err.to_string())),
                )
            }
            None => {
                let body = self.body.clone();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut context)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(&*payload);
                        context.add_detail(TRACEBACK, Content::Traceback(format!("panicked: {message}")));
                        TestOutcome::Failure(message)
                    });
                (outcome, std::mem::take(&mut context.details))
            }
        };

        for manager in acquired.into_iter().rev() {
            manager.release(sink);
        }

        self.report(sink, outcome, details);
        sink.stop_test(&self.id);
    }
}

impl fmt::Debug for FunctionTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTest")
            .field("id", &self.id)
            .field(
                "resources",
                &self.resources.iter().map(|(a, _)| a).collect::<Vec<_>>(),
            )
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResultConfig;
    use crate::models::Outcome;
    use crate::resource::{FnFixture, Handle};
    use crate::result::ResultCollector;

    fn counter_manager() -> Arc<ResourceManager> {
        ResourceManager::builder(
            "Counter",
            FnFixture::new(|_| Ok(Arc::new(41_u32) as Handle)),
        )
        .build()
    }

    #[test]
    fn test_body_sees_typed_resource() {
        let manager = counter_manager();
        let test = FunctionTest::new("demo.typed", |ctx| {
            match ctx.get::<u32>("counter") {
                Some(41) => TestOutcome::Success,
                other => TestOutcome::Failure(format!("unexpected {other:?}")),
            }
        })
        .with_resource("counter", &manager);

        let sink = ResultCollector::new(ResultConfig::quiet());
        test.run(&sink);

        let result = sink.snapshot();
        assert_eq!(result.records[0].outcome, Outcome::Success);
        assert_eq!(manager.uses(), 0);
    }

    #[test]
    fn test_panic_is_reported_as_failure() {
        let test = FunctionTest::new("demo.panics", |_| {
            assert_eq!(1 + 1, 3, "arithmetic is broken");
            TestOutcome::Success
        });
        let sink = ResultCollector::new(ResultConfig::quiet());
        test.run(&sink);

        let record = &sink.snapshot().records[0];
        assert_eq!(record.outcome, Outcome::Failure);
        assert!(record.reason.as_deref().unwrap().contains("arithmetic is broken"));
        assert!(record.details.get(TRACEBACK).is_some());
    }

    #[test]
    fn test_outcomes_carry_reason_and_details() {
        let test = FunctionTest::new("demo.skip", |ctx| {
            ctx.add_detail("note", Content::text("first"));
            assert_eq!(ctx.add_detail("note", Content::text("second")), "note-1");
            TestOutcome::Skip("not today".into())
        });
        let sink = ResultCollector::new(ResultConfig::quiet());
        test.run(&sink);

        let record = &sink.snapshot().records[0];
        assert_eq!(record.outcome, Outcome::Skip);
        assert_eq!(record.reason.as_deref(), Some("not today"));
        assert_eq!(record.details.len(), 2);
    }

    #[test]
    fn test_anyhow_error_converts_to_error() {
        let outcome: TestOutcome = Err(anyhow::anyhow!("socket closed")).into();
        assert_eq!(outcome, TestOutcome::Error("socket closed".into()));
        let outcome: TestOutcome = Ok(()).into();
        assert_eq!(outcome, TestOutcome::Success);
    }

    #[test]
    fn test_mark_dirty_resets_for_next_holder() {
        let manager = counter_manager();
        let sink = ResultCollector::new(ResultConfig::quiet());
        let held = manager.acquire(&sink).unwrap();

        let test = FunctionTest::new("demo.dirty", |ctx| {
            ctx.mark_dirty("counter");
            TestOutcome::Success
        })
        .with_resource("counter", &manager);
        test.run(&sink);

        assert!(manager.is_dirty());
        let fresh = manager.acquire(&sink).unwrap();
        assert!(!fresh.same_as(&held));
    }

    #[test]
    fn test_failed_acquire_is_an_error() {
        let broken = ResourceManager::builder(
            "Broken",
            FnFixture::new(|_| anyhow::bail!("walla walla")),
        )
        .build();
        let body_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = body_ran.clone();
        let test = FunctionTest::new("demo.broken", move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            TestOutcome::Success
        })
        .with_resource("broken", &broken);

        let sink = ResultCollector::new(ResultConfig::quiet());
        test.run(&sink);

        let result = sink.snapshot();
        let record = &result.records[0];
        assert_eq!(record.outcome, Outcome::Error);
        assert_eq!(record.reason.as_deref(), Some(FIXTURE_ERROR_REASON));
        assert!(record
            .details
            .get("fixture")
            .map(|c| c.as_text().contains("walla walla"))
            .unwrap_or(false));
        assert_eq!(result.fixture_errors(), 1);
        assert!(!body_ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(result.warnings.len(), 1);
    }
}
