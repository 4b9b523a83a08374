//! Demo suite
//!
//! A small set of resources and tests that exercises every path of the
//! runner: shared fixtures with dependencies, a fixture that cannot be
//! created, a fixture that cannot be destroyed, and each test outcome.

use anyhow::bail;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::SuiteConfig;
use crate::models::Content;
use crate::resource::{Dependencies, FnFixture, Handle, ResourceManager};
use crate::suite::{ErrorTolerantSuite, FunctionTest, TestOutcome, TestRef};

/// Name under which demo runs are stored
pub const SUITE_NAME: &str = "demo";

/// What every demo fixture hands out
#[derive(Debug)]
pub struct DemoResource {
    pub name: &'static str,
}

fn make(name: &'static str) -> impl Fn(&Dependencies) -> anyhow::Result<Handle> + Send + Sync {
    move |_| Ok(Arc::new(DemoResource { name }) as Handle)
}

/// The demo resource managers
#[derive(Clone, Debug)]
pub struct DemoResources {
    pub a: Arc<ResourceManager>,
    /// Depends on `a`
    pub b: Arc<ResourceManager>,
    /// Depends on `b`
    pub c: Arc<ResourceManager>,
    /// Construction always fails
    pub create_fail: Arc<ResourceManager>,
    /// Teardown always fails
    pub destroy_fail: Arc<ResourceManager>,
}

impl DemoResources {
    pub fn new() -> Self {
        let a = ResourceManager::builder("ResourceA", FnFixture::new(make("A")))
            .setup_cost(1)
            .teardown_cost(1)
            .build();
        let b = ResourceManager::builder("ResourceB", FnFixture::new(make("B")))
            .setup_cost(2)
            .teardown_cost(1)
            .depends_on("A", &a)
            .build();
        let c = ResourceManager::builder("ResourceC", FnFixture::new(make("C")))
            .setup_cost(3)
            .teardown_cost(1)
            .depends_on("B", &b)
            .build();

        let create_fail = ResourceManager::builder(
            "CreateFailResource",
            FnFixture::new(|_| {
                info!("making walla walla");
                bail!("walla walla")
            })
            .on_clean(|_| {
                info!("cleaning walla walla");
                Ok(())
            }),
        )
        .setup_cost(9)
        .teardown_cost(1)
        .build();

        let destroy_fail = ResourceManager::builder(
            "DestroyFailResource",
            FnFixture::new(|_| {
                info!("making booga booga");
                Ok(Arc::new(DemoResource { name: "booga" }) as Handle)
            })
            .on_clean(|_| {
                info!("cleaning booga booga");
                bail!("booga booga")
            }),
        )
        .setup_cost(8)
        .teardown_cost(1)
        .build();

        Self {
            a,
            b,
            c,
            create_fail,
            destroy_fail,
        }
    }
}

impl Default for DemoResources {
    fn default() -> Self {
        Self::new()
    }
}

/// Every demo test, in declaration order
pub fn tests() -> Vec<TestRef> {
    tests_with(&DemoResources::new())
}

pub fn tests_with(resources: &DemoResources) -> Vec<TestRef> {
    vec![
        FunctionTest::new("demo.outcomes.test_pass", |ctx| {
            debug!("a debug message");
            ctx.add_detail("stdout", Content::text("a message to stdout"));
            TestOutcome::Success
        })
        .into_ref(),
        FunctionTest::new("demo.outcomes.test_fail", |_| {
            TestOutcome::Failure("to test failure".into())
        })
        .into_ref(),
        FunctionTest::new("demo.outcomes.test_skip", |_| {
            info!("an info message");
            TestOutcome::Skip("to test skip".into())
        })
        .into_ref(),
        FunctionTest::new("demo.outcomes.test_error", |_| {
            error!("an error message");
            TestOutcome::from(Err(anyhow::anyhow!("to test error")))
        })
        .into_ref(),
        FunctionTest::new("demo.outcomes.test_known_bug", |_| {
            TestOutcome::ExpectedFailure("tracked upstream".into())
        })
        .into_ref(),
        FunctionTest::new("demo.chain.test_uses_c", |ctx| {
            match ctx.get::<DemoResource>("C") {
                Some(resource) if resource.name == "C" => TestOutcome::Success,
                _ => TestOutcome::Failure("resource C missing".into()),
            }
        })
        .with_resource("C", &resources.c)
        .into_ref(),
        FunctionTest::new("demo.chain.test_dirties_a", |ctx| {
            ctx.mark_dirty("A");
            TestOutcome::Success
        })
        .with_resource("A", &resources.a)
        .into_ref(),
        FunctionTest::new("demo.chain.test_uses_b", |ctx| {
            if ctx.resource("B").is_some() {
                TestOutcome::Success
            } else {
                TestOutcome::Failure("resource B missing".into())
            }
        })
        .with_resource("B", &resources.b)
        .into_ref(),
        FunctionTest::new("demo.create_fail.test_1", |_| TestOutcome::Success)
            .with_resource("C", &resources.c)
            .with_resource("F", &resources.create_fail)
            .into_ref(),
        FunctionTest::new("demo.create_fail.test_2", |_| TestOutcome::Success)
            .with_resource("C", &resources.c)
            .with_resource("F", &resources.create_fail)
            .into_ref(),
        FunctionTest::new("demo.destroy_fail.test_1", |_| TestOutcome::Success)
            .with_resource("C", &resources.c)
            .with_resource("F", &resources.destroy_fail)
            .into_ref(),
        FunctionTest::new("demo.destroy_fail.test_2", |_| TestOutcome::Success)
            .with_resource("C", &resources.c)
            .with_resource("F", &resources.destroy_fail)
            .into_ref(),
        FunctionTest::new("demo.heavy.test_slow", |_| TestOutcome::Success)
            .with_concurrency(2)
            .into_ref(),
    ]
}

/// The demo suite with the given scheduling settings
pub fn suite(config: SuiteConfig) -> ErrorTolerantSuite {
    ErrorTolerantSuite::new(config).with_tests(tests())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResultConfig;
    use crate::models::{Outcome, FIXTURE_ERROR_REASON};
    use crate::result::{ResultCollector, ResultSink};

    #[test]
    fn test_demo_ids_unique() {
        let suite = suite(SuiteConfig::sequential());
        let mut ids = suite.list();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_demo_run() {
        let suite = suite(SuiteConfig::sequential());
        let sink = ResultCollector::new(ResultConfig::quiet());
        sink.start_test_run();
        let aborted = suite.run(&sink);
        sink.stop_test_run(aborted);
        let result = sink.into_result();

        let counts = result.counts();
        assert_eq!(counts.tests_run, suite.len());
        assert_eq!(counts.outcomes(), suite.len());
        assert_eq!(counts.failures, 1);
        // test_error plus both create_fail tests
        assert_eq!(counts.errors, 3);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.expected_failures, 1);
        assert_eq!(result.fixture_errors(), 2);
        assert!(result
            .records_with(Outcome::Error)
            .any(|r| r.reason.as_deref() == Some(FIXTURE_ERROR_REASON)));

        let warned: Vec<_> = result.warnings.iter().map(|w| w.fixture.as_str()).collect();
        assert!(warned.contains(&"Creating CreateFailResource"));
        assert!(warned.contains(&"Destroying DestroyFailResource"));
    }
}
