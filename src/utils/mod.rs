//! Shared utilities
//!
//! Logging setup, scoped log capture and timing helpers.

pub mod logger;
pub mod timer;

pub use logger::{init_logger, LogCapture, LogLevel};
pub use timer::{format_duration, Timer};
