//! Results storage and retrieval
//!
//! Finished runs are stored as JSON, one file per run, grouped by suite name.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::models::{RunCounts, RunResult};

/// Stored test run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Suite the run belongs to
    pub suite: String,

    pub stored_at: DateTime<Utc>,

    /// Outcome counts at the time of storing
    pub counts: RunCounts,

    pub successful: bool,

    /// Settings the run used
    pub config: RunSettings,

    pub environment: EnvironmentInfo,

    /// Full recorded result
    pub result: RunResult,
}

/// Settings recorded with a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSettings {
    pub parallel: bool,
    pub concurrency: String,
    pub failfast: bool,
    pub fail_percent: Option<f64>,
    pub uxsuccess_not_failure: bool,
}

impl From<&AppConfig> for RunSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            parallel: config.suite.parallel,
            concurrency: config.suite.concurrency.to_string(),
            failfast: config.result.failfast,
            fail_percent: config.result.fail_percent,
            uxsuccess_not_failure: config.result.uxsuccess_not_failure,
        }
    }
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    pub fn new(suite: &str, config: &AppConfig, result: RunResult) -> Self {
        Self {
            id: generate_run_id(),
            suite: suite.to_string(),
            stored_at: Utc::now(),
            counts: result.counts(),
            successful: result.was_successful(config.result.uxsuccess_not_failure),
            config: RunSettings::from(config),
            environment: EnvironmentInfo::default(),
            result,
        }
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Storage under the user data directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fixture-runner")
            .join("results");
        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn suite_dir(&self, suite: &str) -> PathBuf {
        self.base_dir.join(suite.to_lowercase())
    }

    fn run_path(&self, suite: &str, run_id: &str) -> PathBuf {
        self.suite_dir(suite).join(format!("{run_id}.json"))
    }

    /// Save a run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        let suite_dir = self.suite_dir(&run.suite);
        fs::create_dir_all(&suite_dir)
            .with_context(|| format!("Failed to create {}", suite_dir.display()))?;

        let path = self.run_path(&run.suite, &run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved run results to {}", path.display());
        Ok(path)
    }

    pub fn load(&self, suite: &str, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(suite, run_id);
        let run = self.load_from_path(&path)?;
        debug!("Loaded run results from {}", path.display());
        Ok(run)
    }

    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// All runs of a suite, newest first
    pub fn list_runs(&self, suite: &str) -> Result<Vec<RunInfo>> {
        let suite_dir = self.suite_dir(suite);
        if !suite_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&suite_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(RunInfo {
                        id: run.id,
                        suite: run.suite,
                        stored_at: run.stored_at,
                        counts: run.counts,
                        successful: run.successful,
                    }),
                    Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(runs)
    }

    pub fn latest(&self, suite: &str) -> Result<Option<StoredRun>> {
        match self.list_runs(suite)?.into_iter().next() {
            Some(info) => self.load(suite, &info.id).map(Some),
            None => Ok(None),
        }
    }

    pub fn delete(&self, suite: &str, run_id: &str) -> Result<()> {
        let path = self.run_path(suite, run_id);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted results: {}", path.display());
        }
        Ok(())
    }

    /// Export a run's outcome records
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record(["run_id", "test_id", "outcome", "duration_ms", "reason"])?;

                for record in &run.result.records {
                    writer.write_record([
                        run.id.clone(),
                        record.test_id.clone(),
                        record.outcome.to_string(),
                        record.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
                        record.reason.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub suite: String,
    pub stored_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub successful: bool,
}

/// Export format
#[derive(Clone, Copy, Debug)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}
