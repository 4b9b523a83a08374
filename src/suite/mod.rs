//! Test cases and the error-tolerant suite that runs them

mod case;
mod runner;

pub use case::{DeclaredResources, FunctionTest, TestCase, TestContext, TestOutcome, TestRef};
pub use runner::{ErrorTolerantSuite, StopSignal, SuiteRunner};
