//! Output formatters for run results
//!
//! Provides the end-of-run text summary plus JSON, table and CSV renderings.

use std::io::Write;

use crate::models::{Outcome, OutcomeRecord, RunResult};
use crate::utils::format_duration;

/// Heavy separator printed above each error block
pub const SEPARATOR1: &str =
    "======================================================================";

/// Light separator printed between sections
pub const SEPARATOR2: &str =
    "----------------------------------------------------------------------";

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// The classic end-of-run summary:
///
/// ```text
/// ----------------------------------------------------------------------
/// Ran 3 tests in 0.012s
///
/// FAILED (Error handling fixtures=2) (errors=2)
/// ```
pub fn format_summary(result: &RunResult, uxsuccess_not_failure: bool) -> String {
    let counts = result.counts();
    let mut lines = vec![
        SEPARATOR2.to_string(),
        format!(
            "Ran {} test{} in {}\n",
            counts.tests_run,
            if counts.tests_run == 1 { "" } else { "s" },
            format_duration(result.elapsed_secs())
        ),
    ];

    let mut status = if result.was_successful(uxsuccess_not_failure) {
        "OK".to_string()
    } else {
        "FAILED".to_string()
    };

    let mut infos = Vec::new();
    if !result.was_successful(uxsuccess_not_failure) {
        if counts.failures > 0 {
            infos.push(format!("failures={}", counts.failures));
        }
        if counts.errors > 0 {
            infos.push(format!("errors={}", counts.errors));
        }
    }
    if counts.skipped > 0 {
        infos.push(format!("skipped={}", counts.skipped));
    }
    if counts.expected_failures > 0 {
        infos.push(format!("expected failures={}", counts.expected_failures));
    }
    if counts.unexpected_successes > 0 {
        infos.push(format!("unexpected successes={}", counts.unexpected_successes));
    }

    if !result.reasons.is_empty() {
        let reasons: Vec<String> = result
            .reasons
            .iter()
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect();
        status.push_str(&format!(" ({})", reasons.join(", ")));
    }
    if !infos.is_empty() {
        status.push_str(&format!(" ({})", infos.join(", ")));
    }
    if result.aborted {
        status.push_str(" [aborted]");
    }
    lines.push(status);

    lines.join("\n")
}

/// Detail blocks for warnings, errors and failures, in that order
pub fn format_error_lists(result: &RunResult) -> String {
    let mut output = String::new();

    for warning in &result.warnings {
        push_block(
            &mut output,
            "WARNING",
            &warning.fixture,
            warning.reason.as_deref(),
            &warning.details.to_display_string(),
        );
    }
    for outcome in [Outcome::Error, Outcome::Failure] {
        for record in result.records_with(outcome) {
            push_block(
                &mut output,
                outcome.label(),
                &record.test_id,
                record.reason.as_deref(),
                &record.details.to_display_string(),
            );
        }
    }

    output
}

fn push_block(output: &mut String, flavour: &str, name: &str, reason: Option<&str>, details: &str) {
    output.push_str(SEPARATOR1);
    output.push('\n');
    match reason {
        Some(reason) => output.push_str(&format!("{flavour}: {name} ({reason})\n")),
        None => output.push_str(&format!("{flavour}: {name}\n")),
    }
    output.push_str(SEPARATOR2);
    output.push('\n');
    output.push_str(details);
    output.push('\n');
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
    uxsuccess_not_failure: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
            uxsuccess_not_failure: false,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn uxsuccess_not_failure(mut self, allowed: bool) -> Self {
        self.uxsuccess_not_failure = allowed;
        self
    }

    /// Format a single outcome record
    pub fn format_record(&self, record: &OutcomeRecord) -> String {
        match self.format {
            OutputFormat::Table => self.format_record_table(record),
            OutputFormat::Json => serde_json::to_string(record).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Csv => self.format_record_csv(record),
            OutputFormat::Summary => record.to_string(),
        }
    }

    fn format_record_table(&self, record: &OutcomeRecord) -> String {
        let status = match (self.colorize, record.outcome) {
            (true, Outcome::Success) => "\x1b[32m✓ PASS \x1b[0m",
            (true, Outcome::Failure) => "\x1b[31m✗ FAIL \x1b[0m",
            (true, Outcome::Error) => "\x1b[31m! ERROR\x1b[0m",
            (true, Outcome::Skip) => "\x1b[33m○ SKIP \x1b[0m",
            (true, Outcome::ExpectedFailure) => "\x1b[33mx XFAIL\x1b[0m",
            (true, Outcome::UnexpectedSuccess) => "\x1b[31mu XPASS\x1b[0m",
            (false, Outcome::Success) => "✓ PASS ",
            (false, Outcome::Failure) => "✗ FAIL ",
            (false, Outcome::Error) => "! ERROR",
            (false, Outcome::Skip) => "○ SKIP ",
            (false, Outcome::ExpectedFailure) => "x XFAIL",
            (false, Outcome::UnexpectedSuccess) => "u XPASS",
        };

        let mut line = format!(
            "{:50} {} [{:>6}ms]",
            record.test_id,
            status,
            record.duration_ms.unwrap_or(0)
        );
        if let Some(reason) = &record.reason {
            line.push_str(&format!(" {reason}"));
        }
        line
    }

    fn format_record_csv(&self, record: &OutcomeRecord) -> String {
        format!(
            "{},{},{},\"{}\"",
            record.test_id,
            record.outcome,
            record.duration_ms.unwrap_or(0),
            record.reason.as_deref().unwrap_or("").replace('"', "\"\"")
        )
    }

    /// Format a whole run
    pub fn format_run(&self, result: &RunResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_run_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => self.format_run_csv(result),
            OutputFormat::Summary => format_summary(result, self.uxsuccess_not_failure),
        }
    }

    fn format_run_table(&self, result: &RunResult) -> String {
        let mut output = String::new();
        output.push_str(SEPARATOR1);
        output.push('\n');
        for record in &result.records {
            output.push_str(&self.format_record_table(record));
            output.push('\n');
        }
        output.push_str(SEPARATOR2);
        output.push('\n');
        output.push_str(&format!(" {}\n", result.counts()));
        output.push_str(&format!(
            " Fixtures: {} | Warnings: {} | Duration: {}\n",
            result.fixtures,
            result.warnings.len(),
            format_duration(result.elapsed_secs())
        ));
        output
    }

    fn format_run_csv(&self, result: &RunResult) -> String {
        let mut output = String::from("test_id,outcome,duration_ms,reason\n");
        for record in &result.records {
            output.push_str(&self.format_record_csv(record));
            output.push('\n');
        }
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a formatted run to a file
pub fn write_results_to_file(path: &str, result: &RunResult, format: OutputFormat) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_run(result);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
