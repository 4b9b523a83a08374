//! Output formatting module
//!
//! Provides the run summary and the table, JSON and CSV renderings.

mod formatter;

pub use formatter::{
    format_error_lists, format_summary, write_results_to_file, OutputFormat, ResultFormatter,
    SEPARATOR1, SEPARATOR2,
};
