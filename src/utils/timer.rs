//! Timing helpers
//!
//! Wall-clock timing of runs and fixture operations, and the duration
//! format used in run summaries.

use std::time::{Duration, Instant};
use tracing::debug;

/// Labelled wall-clock timer
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Log the elapsed time at debug level and return it in milliseconds
    pub fn stop(self) -> u64 {
        let ms = self.elapsed_ms();
        debug!("{} took {}ms", self.label, ms);
        ms
    }
}

/// Format a run duration: `12.345s` up to five minutes, `H:MM:SS.mmm` beyond
pub fn format_duration(secs: f64) -> String {
    if secs > 300.0 {
        let whole = secs.trunc() as u64;
        let millis = ((secs - secs.trunc()) * 1000.0) as u64;
        let hours = whole / 3600;
        let minutes = (whole % 3600) / 60;
        let seconds = whole % 60;
        format!("{hours}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{secs:.3}s")
    }
}
