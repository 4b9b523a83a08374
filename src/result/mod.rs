//! Result sinks
//!
//! [`ResultSink`] is the event interface the run loop reports to.
//! [`ResultCollector`] is the in-process implementation and
//! [`ResultAggregator`] merges worker-local results into a master collector.

mod aggregator;
mod collector;
mod sink;

pub use aggregator::{AggregationError, ResultAggregator, WorkerPayload};
pub use collector::{OutputMode, ResultCollector};
pub use sink::ResultSink;
