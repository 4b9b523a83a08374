//! Result sink interface

use crate::models::Details;
use crate::resource::FixtureRef;

/// Receiver of test and fixture lifecycle events.
///
/// Methods take `&self` so one sink can be shared by the run loop, the
/// resource managers and the tests it drives. Reasons travel in `details`
/// under the `reason` name.
pub trait ResultSink: Send + Sync {
    fn start_test_run(&self);

    /// `aborted` is set when the run was cut short by a stop condition
    fn stop_test_run(&self, aborted: bool);

    /// Ids of every test the suite is about to run
    fn register_tests(&self, _test_ids: &[String]) {}

    fn start_test(&self, test_id: &str);
    fn stop_test(&self, test_id: &str);

    fn add_success(&self, test_id: &str, details: Details);
    fn add_failure(&self, test_id: &str, details: Details);
    fn add_error(&self, test_id: &str, details: Details);
    fn add_skip(&self, test_id: &str, details: Details);
    fn add_expected_failure(&self, test_id: &str, details: Details);
    fn add_unexpected_success(&self, test_id: &str, details: Details);

    fn start_fixture(&self, fixture: &FixtureRef);
    fn stop_fixture(&self, fixture: &FixtureRef);

    /// A fixture operation failed; does not affect test outcomes
    fn add_warning(&self, fixture: &FixtureRef, details: Details);

    /// A fixture operation succeeded
    fn add_info(&self, fixture: &FixtureRef);

    /// Whether the run should stop before the next test
    fn should_stop(&self) -> bool {
        false
    }
}
