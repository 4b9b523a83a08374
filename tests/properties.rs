//! End-to-end behaviour of the runner through the public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use anyhow::bail;
use fixture_runner::config::{Concurrency, ResultConfig, SuiteConfig};
use fixture_runner::executor::TestRunner;
use fixture_runner::models::{Outcome, RunResult, FIXTURE_ERROR_REASON};
use fixture_runner::resource::{FnFixture, Handle, ResourceManager, ResourceSet};
use fixture_runner::result::{ResultAggregator, ResultCollector, ResultSink, WorkerPayload};
use fixture_runner::suite::{ErrorTolerantSuite, FunctionTest, StopSignal, SuiteRunner, TestOutcome, TestRef};

fn manager(name: &str, setup: u32) -> Arc<ResourceManager> {
    ResourceManager::builder(name, FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .setup_cost(setup)
        .teardown_cost(1)
        .build()
}

fn walla_walla(name: &str) -> Arc<ResourceManager> {
    ResourceManager::builder(name, FnFixture::new(|_| bail!("walla walla")))
        .setup_cost(9)
        .build()
}

fn booga_booga(name: &str) -> Arc<ResourceManager> {
    ResourceManager::builder(
        name,
        FnFixture::new(|_| Ok(Arc::new(()) as Handle)).on_clean(|_| bail!("booga booga")),
    )
    .setup_cost(8)
    .build()
}

fn test_using(id: &str, managers: &[&Arc<ResourceManager>], outcome: TestOutcome) -> TestRef {
    let mut test = FunctionTest::new(id, move |_| outcome.clone());
    for m in managers {
        test = test.with_resource(m.name(), m);
    }
    test.into_ref()
}

fn run(tests: Vec<TestRef>) -> RunResult {
    let suite = ErrorTolerantSuite::new(SuiteConfig::sequential()).with_tests(tests);
    TestRunner::new(ResultConfig::quiet(), SuiteConfig::sequential()).run_sequential(&suite)
}

/// Fixture events with this operation, in order
fn events(result: &RunResult, op: &str) -> Vec<String> {
    let mut all: Vec<&String> = Vec::new();
    all.extend(result.infos.iter().map(|r| &r.fixture));
    all.extend(result.warnings.iter().map(|r| &r.fixture));
    all.into_iter()
        .filter(|f| f.starts_with(op))
        .cloned()
        .collect()
}

fn outcome_of(result: &RunResult, id: &str) -> Vec<Outcome> {
    result
        .records
        .iter()
        .filter(|r| r.test_id == id)
        .map(|r| r.outcome)
        .collect()
}

#[test]
fn failing_construction_only_errors_dependent_tests() {
    let broken = walla_walla("Broken");
    let above = ResourceManager::builder("Above", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .depends_on("broken", &broken)
        .build();

    let result = run(vec![
        test_using("iso.direct", &[&broken], TestOutcome::Success),
        test_using("iso.transitive", &[&above], TestOutcome::Success),
        test_using("iso.free_pass", &[], TestOutcome::Success),
        test_using("iso.free_fail", &[], TestOutcome::Failure("real bug".into())),
    ]);

    for id in ["iso.direct", "iso.transitive"] {
        let records: Vec<_> = result.records.iter().filter(|r| r.test_id == id).collect();
        assert_eq!(records.len(), 1, "{id}");
        assert_eq!(records[0].outcome, Outcome::Error);
        assert_eq!(records[0].reason.as_deref(), Some(FIXTURE_ERROR_REASON));
    }
    assert_eq!(outcome_of(&result, "iso.free_pass"), vec![Outcome::Success]);
    assert_eq!(outcome_of(&result, "iso.free_fail"), vec![Outcome::Failure]);
    assert_eq!(result.tests_run, 4);
    assert!(result.stopped_at.is_some());
    assert!(!result.aborted);
    // "Above" is never attempted once its dependency failed
    assert!(events(&result, "Creating Above").is_empty());
}

#[test]
fn failing_teardown_is_a_warning_not_a_failure() {
    let sticky = booga_booga("Sticky");
    let result = run(vec![
        test_using("td.one", &[&sticky], TestOutcome::Success),
        test_using("td.two", &[&sticky], TestOutcome::Success),
    ]);

    assert!(result.stopped_at.is_some());
    let counts = result.counts();
    assert_eq!(counts.successes, 2);
    assert_eq!(counts.failures + counts.errors, 0);

    let warnings: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.fixture == "Destroying Sticky")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].reason.as_deref(), Some("booga booga"));
    assert!(result.was_successful(false));
}

#[test]
fn merging_is_order_independent() {
    let worker_result = |outcomes: &[(&str, TestOutcome)]| {
        let tests: Vec<TestRef> = outcomes
            .iter()
            .map(|(id, outcome)| test_using(id, &[], outcome.clone()))
            .collect();
        run(tests)
    };
    let results = [
        worker_result(&[
            ("m.a", TestOutcome::Success),
            ("m.b", TestOutcome::Failure("flaky".into())),
        ]),
        worker_result(&[
            ("m.c", TestOutcome::Error("boom".into())),
            ("m.d", TestOutcome::Skip("later".into())),
        ]),
        worker_result(&[
            ("m.e", TestOutcome::ExpectedFailure("known".into())),
            ("m.f", TestOutcome::UnexpectedSuccess),
            ("m.g", TestOutcome::Failure("flaky".into())),
        ]),
    ];

    let merged = |order: [usize; 3]| {
        let master = Arc::new(ResultCollector::new(ResultConfig::quiet()));
        let aggregator = ResultAggregator::new(master.clone());
        for i in order {
            aggregator
                .absorb(WorkerPayload::new(i, results[i].clone()))
                .unwrap();
        }
        master.snapshot()
    };

    let reference = merged([0, 1, 2]);
    assert_eq!(reference.tests_run, 7);
    assert_eq!(reference.reasons.get("flaky"), Some(&2));

    for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        let other = merged(order);
        assert_eq!(other.counts(), reference.counts());
        assert_eq!(other.reasons, reference.reasons);
    }
}

#[test]
fn concurrent_acquire_builds_once() {
    let shared = manager("Shared", 1);
    let sink = ResultCollector::new(ResultConfig::quiet());
    let threads = 8;
    let barrier = Barrier::new(threads);

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                shared.acquire(&sink).unwrap();
                barrier.wait();
                shared.release(&sink);
            });
        }
    });

    let result = sink.into_result();
    assert_eq!(events(&result, "Creating Shared").len(), 1);
    assert_eq!(events(&result, "Destroying Shared").len(), 1);
    assert_eq!(shared.uses(), 0);
}

#[test]
fn switching_groups_keeps_shared_dependency() {
    let a = manager("A", 1);
    let b = ResourceManager::builder("B", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .setup_cost(2)
        .teardown_cost(1)
        .depends_on("A", &a)
        .build();
    let c = ResourceManager::builder("C", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .setup_cost(3)
        .teardown_cost(1)
        .depends_on("B", &b)
        .build();

    let sink = ResultCollector::new(ResultConfig::quiet());
    let mut runner = SuiteRunner::new(StopSignal::new());

    let needs_c: ResourceSet = c.needed_resources().into_iter().collect();
    let needs_a: ResourceSet = a.needed_resources().into_iter().collect();
    runner.switch(&needs_c, &sink).unwrap();
    runner.switch(&needs_a, &sink).unwrap();

    let result = sink.snapshot();
    assert_eq!(
        events(&result, "Creating"),
        vec!["Creating A", "Creating B", "Creating C"]
    );
    assert_eq!(
        events(&result, "Destroying"),
        vec!["Destroying C", "Destroying B"]
    );
    assert_eq!(a.uses(), 1);

    runner.drain(&sink);
    assert_eq!(a.uses(), 0);
}

#[test]
fn scheduled_run_builds_each_fixture_once() {
    let a = manager("A", 1);
    let b = ResourceManager::builder("B", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .setup_cost(2)
        .depends_on("A", &a)
        .build();
    let c = ResourceManager::builder("C", FnFixture::new(|_| Ok(Arc::new(()) as Handle)))
        .setup_cost(3)
        .depends_on("B", &b)
        .build();

    let result = run(vec![
        test_using("s.needs_a", &[&a], TestOutcome::Success),
        test_using("s.needs_c", &[&c], TestOutcome::Success),
    ]);

    let order: Vec<_> = result.records.iter().map(|r| r.test_id.as_str()).collect();
    assert_eq!(order, vec!["s.needs_c", "s.needs_a"]);
    assert_eq!(events(&result, "Creating").len(), 3);
    assert_eq!(events(&result, "Creating A").len(), 1);
    // B and C on the switch, A on the final drain
    assert_eq!(
        events(&result, "Destroying"),
        vec!["Destroying C", "Destroying B", "Destroying A"]
    );
}

#[test]
fn shared_failing_fixture_warns_once_per_group() {
    let broken = walla_walla("Walla");
    let result = run(vec![
        test_using("w.one", &[&broken], TestOutcome::Success),
        test_using("w.two", &[&broken], TestOutcome::Success),
    ]);

    let counts = result.counts();
    assert_eq!(counts.errors, 2);
    assert_eq!(result.fixture_errors(), 2);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].fixture, "Creating Walla");
    assert_eq!(result.warnings[0].reason.as_deref(), Some("walla walla"));
}

#[test]
fn parallel_run_reports_every_test_once() {
    let a = manager("A", 1);
    let b = manager("B", 1);
    let broken = walla_walla("Broken");
    let tests = vec![
        test_using("p.a1", &[&a], TestOutcome::Success),
        test_using("p.b1", &[&b], TestOutcome::Success),
        test_using("p.a2", &[&a], TestOutcome::Failure("nope".into())),
        test_using("p.broken", &[&broken], TestOutcome::Success),
        test_using("p.free", &[], TestOutcome::Success),
    ];
    let config = SuiteConfig::parallel(Concurrency::Fixed(3));
    let suite = ErrorTolerantSuite::new(config.clone()).with_tests(tests);

    let result = tokio_test::block_on(TestRunner::new(ResultConfig::quiet(), config).run(&suite))
        .unwrap();

    let mut ids: Vec<_> = result.records.iter().map(|r| r.test_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["p.a1", "p.a2", "p.b1", "p.broken", "p.free"]);
    assert_eq!(result.tests_run, 5);
    assert_eq!(result.fixture_errors(), 1);
    assert_eq!(result.counts().failures, 1);
    assert!(!result.was_successful(false));
}

#[test]
fn failfast_stops_and_still_drains() {
    let a = manager("A", 1);
    let config = ResultConfig::quiet().failfast(true);
    let suite = ErrorTolerantSuite::new(SuiteConfig::sequential()).with_tests(vec![
        test_using("ff.1", &[&a], TestOutcome::Failure("first".into())),
        test_using("ff.2", &[&a], TestOutcome::Success),
    ]);

    let sink = ResultCollector::new(config);
    let aborted = TestRunner::new(ResultConfig::quiet(), SuiteConfig::sequential())
        .run_sequential_with(&suite, &sink);
    assert!(aborted);
    assert!(sink.should_stop());

    let result = sink.into_result();
    assert!(result.aborted);
    assert_eq!(result.records.len(), 1);
    assert_eq!(events(&result, "Destroying A").len(), 1);
    assert_eq!(a.uses(), 0);
}

#[test]
fn failed_reset_inside_a_group_is_a_fixture_error() {
    let makes = Arc::new(AtomicUsize::new(0));
    let cleans = Arc::new(AtomicUsize::new(0));
    let (m, c) = (makes.clone(), cleans.clone());
    let flaky = ResourceManager::builder(
        "Flaky",
        FnFixture::new(move |_| {
            if m.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Arc::new(()) as Handle)
            } else {
                bail!("rebuild failed")
            }
        })
        .on_clean(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
    .build();

    let dirties = FunctionTest::new("reset.t1", |ctx| {
        ctx.mark_dirty("Flaky");
        TestOutcome::Success
    })
    .with_resource("Flaky", &flaky)
    .into_ref();
    let result = run(vec![
        dirties,
        test_using("reset.t2", &[&flaky], TestOutcome::Success),
    ]);

    assert_eq!(outcome_of(&result, "reset.t1"), vec![Outcome::Success]);
    let t2: Vec<_> = result.records.iter().filter(|r| r.test_id == "reset.t2").collect();
    assert_eq!(t2.len(), 1);
    assert_eq!(t2[0].outcome, Outcome::Error);
    assert_eq!(t2[0].reason.as_deref(), Some(FIXTURE_ERROR_REASON));
    assert_eq!(result.fixture_errors(), 1);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].fixture, "Resetting Flaky");

    // one instance built, destroyed once by the failed reset and never again
    assert_eq!(makes.load(Ordering::SeqCst), 2);
    assert_eq!(cleans.load(Ordering::SeqCst), 1);
    assert!(events(&result, "Destroying Flaky").is_empty());
    assert_eq!(flaky.uses(), 0);
}
