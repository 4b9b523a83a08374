//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use super::{AppConfig, Concurrency, Verbosity};

/// Environment variable prefix
const ENV_PREFIX: &str = "FIXTURE_RUNNER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Config file from FIXTURE_RUNNER_CONFIG
    pub config_file: Option<String>,
    /// Failfast from FIXTURE_RUNNER_FAILFAST
    pub failfast: Option<bool>,
    /// Fail percent from FIXTURE_RUNNER_FAIL_PERCENT
    pub fail_percent: Option<f64>,
    /// Parallel from FIXTURE_RUNNER_PARALLEL
    pub parallel: Option<bool>,
    /// Concurrency from FIXTURE_RUNNER_CONCURRENCY
    pub concurrency: Option<Concurrency>,
    /// Verbosity from FIXTURE_RUNNER_VERBOSITY
    pub verbosity: Option<Verbosity>,
    /// Failing file from FIXTURE_RUNNER_FAILING_FILE
    pub failing_file: Option<String>,
    /// Log level from FIXTURE_RUNNER_LOG
    pub log_level: Option<String>,
    /// Worker id from FIXTURE_RUNNER_WORKER_ID, set inside parallel workers
    pub worker_id: Option<usize>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_vars(env::vars())
    }

    /// Load from an explicit set of variables
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let prefix = format!("{ENV_PREFIX}_");
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|name| (name.to_string(), v)))
            .collect();

        let get = |name: &str| vars.get(name).cloned();
        let get_bool = |name: &str| vars.get(name).map(|v| parse_bool(v));

        Self {
            config_file: get("CONFIG"),
            failfast: get_bool("FAILFAST"),
            fail_percent: get("FAIL_PERCENT").and_then(|v| v.parse().ok()),
            parallel: get_bool("PARALLEL"),
            concurrency: get("CONCURRENCY").and_then(|v| v.parse().ok()),
            verbosity: get("VERBOSITY").and_then(|v| Verbosity::from_str(&v)),
            failing_file: get("FAILING_FILE"),
            log_level: get("LOG"),
            worker_id: get("WORKER_ID").and_then(|v| v.parse().ok()),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Override `config` with every variable that is set
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(failfast) = self.failfast {
            config.result.failfast = failfast;
        }
        if let Some(percent) = self.fail_percent {
            config.result.fail_percent = Some(percent);
        }
        if let Some(parallel) = self.parallel {
            config.suite.parallel = parallel;
        }
        if let Some(concurrency) = self.concurrency {
            config.suite.concurrency = concurrency;
        }
        if let Some(verbosity) = self.verbosity {
            config.result.verbosity = verbosity;
        }
        if let Some(path) = &self.failing_file {
            config.result.failing_file = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

/// Parse an environment boolean
fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all FIXTURE_RUNNER environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!("  {ENV_PREFIX}_FAILFAST      Stop on first failure (true/false)");
    println!("  {ENV_PREFIX}_FAIL_PERCENT  Stop after this % of fixture errors");
    println!("  {ENV_PREFIX}_PARALLEL      Enable parallel execution (true/false)");
    println!("  {ENV_PREFIX}_CONCURRENCY   Worker count or 'auto'");
    println!("  {ENV_PREFIX}_VERBOSITY     quiet, dots, reason-only, verbose");
    println!("  {ENV_PREFIX}_FAILING_FILE  File receiving failed test ids ('' disables)");
    println!("  {ENV_PREFIX}_LOG           Log level (trace, debug, info, warn, error)");
}
