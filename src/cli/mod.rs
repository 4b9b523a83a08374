//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AppConfig, Concurrency, Verbosity};

/// Error-tolerant test runner with shared, dependency-ordered fixtures
#[derive(Parser, Debug)]
#[command(name = "fixture-runner")]
#[command(version)]
#[command(about = "Run tests that share expensive fixtures, tolerating fixture failures")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the demo suite
    Run(RunArgs),

    /// List tests in scheduled order
    List(ListArgs),

    /// View stored run results
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Only run these test ids
    pub ids: Vec<String>,

    /// Stop on first failure or error
    #[arg(short, long)]
    pub failfast: bool,

    /// Do not treat unexpected successes as failures
    #[arg(long)]
    pub uxsuccess_not_failure: bool,

    /// Stop once this percentage of tests errored on fixtures
    #[arg(long)]
    pub fail_percent: Option<f64>,

    /// Run buckets on concurrent workers
    #[arg(short, long)]
    pub parallel: bool,

    /// Worker count, or 'auto' to bucket by test weight
    #[arg(short, long)]
    pub concurrency: Option<String>,

    /// No progress output
    #[arg(short, long, group = "verbosity")]
    pub quiet: bool,

    /// One character per test
    #[arg(short, long, group = "verbosity")]
    pub dots: bool,

    /// One line per test, with the reason of failures
    #[arg(short, long, group = "verbosity")]
    pub reason_only: bool,

    /// One line per test and fixture operation, with timings
    #[arg(short, long, group = "verbosity")]
    pub verbose: bool,

    /// Print details right after each test
    #[arg(short, long)]
    pub early_details: bool,

    /// File receiving the ids of failed tests ('' disables)
    #[arg(long)]
    pub failing_file: Option<String>,

    /// Only run the tests listed in the failing file
    #[arg(long)]
    pub failing: bool,

    /// Print the recorded run in this format (table, json, json-pretty, csv, summary)
    #[arg(long)]
    pub format: Option<String>,

    /// Store the finished run under the data directory
    #[arg(short, long)]
    pub save: bool,

    /// Write the recorded run to a file (format from --format, default json)
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    /// Explicit verbosity flag, if any
    pub fn verbosity(&self) -> Option<Verbosity> {
        if self.quiet {
            Some(Verbosity::Quiet)
        } else if self.dots {
            Some(Verbosity::Dots)
        } else if self.reason_only {
            Some(Verbosity::ReasonOnly)
        } else if self.verbose {
            Some(Verbosity::Verbose)
        } else {
            None
        }
    }

    /// Override `config` with every flag that was given
    pub fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if self.failfast {
            config.result.failfast = true;
        }
        if self.uxsuccess_not_failure {
            config.result.uxsuccess_not_failure = true;
        }
        if let Some(percent) = self.fail_percent {
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(anyhow!("--fail-percent must be in (0, 100], got {percent}"));
            }
            config.result.fail_percent = Some(percent);
        }
        if self.parallel {
            config.suite.parallel = true;
        }
        if let Some(concurrency) = &self.concurrency {
            config.suite.concurrency = concurrency
                .parse::<Concurrency>()
                .map_err(|e| anyhow!("--concurrency: {e}"))?;
        }
        if let Some(verbosity) = self.verbosity() {
            config.result.verbosity = verbosity;
        }
        if self.early_details {
            config.result.early_details = true;
        }
        if let Some(path) = &self.failing_file {
            config.result.failing_file = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        Ok(())
    }
}

/// Arguments for list command
#[derive(ClapArgs, Debug)]
pub struct ListArgs {
    /// Show resources and weight of each test
    #[arg(short, long)]
    pub detailed: bool,

    /// Show the parallel buckets instead of the sequential order
    #[arg(short, long)]
    pub buckets: bool,

    /// Worker count, or 'auto', used with --buckets
    #[arg(short, long)]
    pub concurrency: Option<String>,
}

/// Arguments for results command
#[derive(ClapArgs, Debug)]
pub struct ResultsArgs {
    /// Show this run instead of the latest
    #[arg(short, long)]
    pub run: Option<String>,

    /// List stored runs only
    #[arg(short, long)]
    pub list: bool,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "summary")]
    pub format: String,

    /// Export the run to a file (.json or .csv)
    #[arg(short, long)]
    pub export: Option<String>,

    /// Results directory (defaults to the user data directory)
    #[arg(long)]
    pub dir: Option<String>,
}

/// Arguments for config management
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with default values
    Init {
        /// Output path
        #[arg(short, long, default_value = "./fixture-runner.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file (defaults to the first one found)
        file: Option<String>,
    },

    /// List supported environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["fixture-runner", "list", "--detailed"]);
        match args.command {
            Command::List(list_args) => {
                assert!(list_args.detailed);
                assert!(!list_args.buckets);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "fixture-runner",
            "run",
            "--parallel",
            "--concurrency",
            "auto",
            "-r",
            "--fail-percent",
            "50",
            "demo.outcomes.test_pass",
        ]);
        let Command::Run(run_args) = args.command else {
            panic!("Expected Run command");
        };
        assert_eq!(run_args.ids, vec!["demo.outcomes.test_pass"]);

        let mut config = AppConfig::default();
        run_args.apply(&mut config).unwrap();
        assert!(config.suite.parallel);
        assert_eq!(config.suite.concurrency, Concurrency::Auto);
        assert_eq!(config.result.verbosity, Verbosity::ReasonOnly);
        assert_eq!(config.result.fail_percent, Some(50.0));
    }

    #[test]
    fn test_verbosity_flags_conflict() {
        assert!(Args::try_parse_from(["fixture-runner", "run", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_empty_failing_file_disables_it() {
        let args = RunArgs {
            failing_file: Some(String::new()),
            ..Default::default()
        };
        let mut config = AppConfig::default();
        args.apply(&mut config).unwrap();
        assert!(config.result.failing_file.is_none());
    }

    #[test]
    fn test_bad_concurrency_rejected() {
        let args = RunArgs {
            concurrency: Some("0".into()),
            ..Default::default()
        };
        assert!(args.apply(&mut AppConfig::default()).is_err());
    }
}
