//! Configuration module
//!
//! Typed run configuration. Values come from a config file, then
//! `FIXTURE_RUNNER_*` environment variables, then command-line flags.

pub mod env;
pub mod file;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use env::EnvConfig;
pub use file::ConfigFile;

/// Default failing-tests file
pub const DEFAULT_FAILING_FILE: &str = ".failing";

/// Default number of parallel workers
pub const DEFAULT_CONCURRENCY: usize = 2;

/// How much progress output the result collector prints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    Quiet,
    #[default]
    Dots,
    ReasonOnly,
    Verbose,
}

impl Verbosity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quiet" | "q" => Some(Verbosity::Quiet),
            "dots" | "d" => Some(Verbosity::Dots),
            "reason-only" | "reason" | "r" => Some(Verbosity::ReasonOnly),
            "verbose" | "v" => Some(Verbosity::Verbose),
            _ => None,
        }
    }
}

/// Result sink settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultConfig {
    /// Stop on first failure or error
    pub failfast: bool,

    /// Do not count unexpected successes as failures
    pub uxsuccess_not_failure: bool,

    /// Stop once this percentage of registered tests errored on fixtures
    pub fail_percent: Option<f64>,

    pub verbosity: Verbosity,

    /// Print details right after each test instead of at the end
    pub early_details: bool,

    /// Where ids of failed tests are written
    pub failing_file: Option<PathBuf>,

    /// Output is interleaved from several workers
    pub parallel: bool,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            failfast: false,
            uxsuccess_not_failure: false,
            fail_percent: None,
            verbosity: Verbosity::Dots,
            early_details: false,
            failing_file: Some(PathBuf::from(DEFAULT_FAILING_FILE)),
            parallel: false,
        }
    }
}

impl ResultConfig {
    /// No console output and no failing file
    pub fn quiet() -> Self {
        Self {
            verbosity: Verbosity::Quiet,
            failing_file: None,
            ..Self::default()
        }
    }

    pub fn failfast(mut self, failfast: bool) -> Self {
        self.failfast = failfast;
        self
    }

    pub fn uxsuccess_not_failure(mut self, allowed: bool) -> Self {
        self.uxsuccess_not_failure = allowed;
        self
    }

    pub fn with_fail_percent(mut self, percent: f64) -> Self {
        self.fail_percent = Some(percent);
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_failing_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing_file = Some(path.into());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Settings for a worker-local result: no console output, no failing
    /// file, same stop conditions.
    pub fn for_worker(&self) -> Self {
        Self {
            verbosity: Verbosity::Quiet,
            early_details: false,
            failing_file: None,
            parallel: true,
            ..self.clone()
        }
    }
}

/// Number of parallel workers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConcurrency", into = "RawConcurrency")]
pub enum Concurrency {
    /// Exactly this many buckets
    Fixed(usize),
    /// One bucket per declared test weight
    Auto,
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::Fixed(DEFAULT_CONCURRENCY)
    }
}

impl FromStr for Concurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Concurrency::Auto);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("concurrency must be at least 1".to_string()),
            Ok(n) => Ok(Concurrency::Fixed(n)),
            Err(_) => Err(format!("invalid concurrency '{s}', expected a number or 'auto'")),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Fixed(n) => write!(f, "{n}"),
            Concurrency::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawConcurrency {
    Count(usize),
    Word(String),
}

impl TryFrom<RawConcurrency> for Concurrency {
    type Error = String;

    fn try_from(raw: RawConcurrency) -> Result<Self, Self::Error> {
        match raw {
            RawConcurrency::Count(n) => n.to_string().parse(),
            RawConcurrency::Word(s) => s.parse(),
        }
    }
}

impl From<Concurrency> for RawConcurrency {
    fn from(value: Concurrency) -> Self {
        match value {
            Concurrency::Fixed(n) => RawConcurrency::Count(n),
            Concurrency::Auto => RawConcurrency::Word("auto".to_string()),
        }
    }
}

/// Suite scheduling settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Run buckets on concurrent workers
    pub parallel: bool,
    pub concurrency: Concurrency,
}

impl SuiteConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel(concurrency: Concurrency) -> Self {
        Self {
            parallel: true,
            concurrency,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level for the `fixture_runner` target
    pub log_level: String,

    pub result: ResultConfig,

    pub suite: SuiteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            result: ResultConfig::default(),
            suite: SuiteConfig::default(),
        }
    }
}
