//! Fixture Runner - error-tolerant test runner
//!
//! Runs suites whose tests share expensive fixtures. Tests are grouped and
//! ordered so each fixture is built as few times as possible, and fixture
//! failures become warnings and test errors instead of aborting the run.
//!
//! ## Usage
//!
//! ```bash
//! # Run the demo suite with one line per test
//! fixture-runner run -v
//!
//! # Run in parallel, one bucket per test weight
//! fixture-runner run --parallel --concurrency auto
//!
//! # Re-run only what failed last time
//! fixture-runner run --failing
//!
//! # Show the scheduled order
//! fixture-runner list --detailed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use fixture_runner::cli::{self, Args};
use fixture_runner::config::{
    self, AppConfig, Concurrency, ConfigFile, EnvConfig, SuiteConfig, DEFAULT_FAILING_FILE,
};
use fixture_runner::demo;
use fixture_runner::executor::TestRunner;
use fixture_runner::output::{write_results_to_file, OutputFormat, ResultFormatter};
use fixture_runner::results::{ExportFormat, ResultsStorage, StoredRun};
use fixture_runner::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    init_logger(LogLevel::from_str(&config.log_level).unwrap_or(LogLevel::Warn));

    match args.command {
        cli::Command::Run(run_args) => {
            let successful = run_tests(run_args, config).await?;
            if !successful {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_tests(list_args, &config)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, args.config.as_deref(), &config)?;
        }
    }

    Ok(())
}

/// Defaults, then the config file, then environment variables
fn load_config(explicit: Option<&str>) -> Result<AppConfig> {
    let env = EnvConfig::load();
    let path = explicit.map(String::from).or_else(|| env.config_file.clone());

    let file = match path {
        Some(path) => ConfigFile::load(&path)?,
        None => ConfigFile::load_default()?,
    };

    let mut config = file.app;
    env.apply(&mut config);
    Ok(config)
}

async fn run_tests(args: cli::RunArgs, mut config: AppConfig) -> Result<bool> {
    args.apply(&mut config)?;

    let mut ids = args.ids.clone();
    if args.failing {
        let path = config
            .result
            .failing_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILING_FILE));
        ids.extend(read_failing(&path)?);
    }

    let mut suite = demo::suite(config.suite.clone());
    if !ids.is_empty() || args.failing {
        suite = suite.filter_by_ids(&ids);
    }

    info!(
        "Running {} tests ({})",
        suite.len(),
        if config.suite.parallel {
            format!("parallel, concurrency {}", config.suite.concurrency)
        } else {
            "sequential".to_string()
        }
    );

    let runner = TestRunner::from_config(&config);
    let result = runner.run(&suite).await?;
    let uxsuccess = config.result.uxsuccess_not_failure;

    let format = match &args.format {
        Some(name) => Some(
            OutputFormat::from_str(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown output format: {name}"))?,
        ),
        None => None,
    };

    if let Some(format) = format {
        let formatter = ResultFormatter::new(format).uxsuccess_not_failure(uxsuccess);
        println!("{}", formatter.format_run(&result));
    }

    if let Some(path) = &args.output {
        write_results_to_file(path, &result, format.unwrap_or(OutputFormat::JsonPretty))?;
        println!("Results written to {path}");
    }

    let successful = result.was_successful(uxsuccess);

    if args.save {
        let storage = ResultsStorage::default_dir();
        let run = StoredRun::new(demo::SUITE_NAME, &config, result);
        let path = storage.save(&run)?;
        println!("Run {} saved to {}", run.id, path.display());
    }

    Ok(successful)
}

/// Ids listed in a failing file, one per line
fn read_failing(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        debug!("No failing file at {}", path.display());
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read failing file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn list_tests(args: cli::ListArgs, config: &AppConfig) -> Result<()> {
    let mut suite_config: SuiteConfig = config.suite.clone();
    if let Some(concurrency) = &args.concurrency {
        suite_config.concurrency = concurrency
            .parse::<Concurrency>()
            .map_err(|e| anyhow::anyhow!("--concurrency: {e}"))?;
    }
    let suite = demo::suite(suite_config);

    if args.buckets {
        for (i, bucket) in suite.buckets().iter().enumerate() {
            println!("Bucket {i} ({} tests):", bucket.len());
            for id in bucket.test_ids() {
                println!("  {id}");
            }
        }
        return Ok(());
    }

    for group in suite.schedule() {
        if args.detailed {
            let names = group.resources.names();
            if names.is_empty() {
                println!("[no resources]");
            } else {
                println!("[{}]", names.join(", "));
            }
            for test in &group.tests {
                println!("  {:50} weight {}", test.id(), test.concurrency());
            }
        } else {
            for test in &group.tests {
                println!("{}", test.id());
            }
        }
    }

    Ok(())
}

fn show_results(args: cli::ResultsArgs) -> Result<()> {
    let storage = match &args.dir {
        Some(dir) => ResultsStorage::new(dir),
        None => ResultsStorage::default_dir(),
    };

    if args.list {
        let runs = storage.list_runs(demo::SUITE_NAME)?;
        if runs.is_empty() {
            println!("No stored runs in {}", storage.base_dir().display());
            println!("Run tests with: fixture-runner run --save");
            return Ok(());
        }
        for run in runs {
            println!(
                "{} | {} | {} | {}",
                run.id,
                run.stored_at.format("%Y-%m-%d %H:%M:%S"),
                if run.successful { "OK" } else { "FAILED" },
                run.counts
            );
        }
        return Ok(());
    }

    let run = match &args.run {
        Some(id) => storage.load(demo::SUITE_NAME, id)?,
        None => match storage.latest(demo::SUITE_NAME)? {
            Some(run) => run,
            None => {
                println!("No stored runs found.");
                return Ok(());
            }
        },
    };

    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", args.format))?;
    let formatter =
        ResultFormatter::new(format).uxsuccess_not_failure(run.config.uxsuccess_not_failure);
    println!("Run {} ({})", run.id, run.stored_at.format("%Y-%m-%d %H:%M:%S"));
    println!("{}", formatter.format_run(&run.result));

    if let Some(export_path) = &args.export {
        let path = PathBuf::from(export_path);
        let format = ExportFormat::from_extension(&path).unwrap_or(ExportFormat::Json);
        storage.export(&run, &path, format)?;
        println!("Exported to: {}", path.display());
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, explicit: Option<&str>, effective: &AppConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::default().save(path)?;
            println!("Configuration file created: {output}");
        }

        cli::ConfigAction::Show { format } => {
            let output = if format == "json" {
                serde_json::to_string_pretty(effective)?
            } else {
                serde_yaml::to_string(effective)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(|| explicit.map(String::from))
                .or_else(|| ConfigFile::find().map(|p| p.to_string_lossy().to_string()))
                .unwrap_or_else(|| "./fixture-runner.yaml".to_string());

            match ConfigFile::load(&path) {
                Ok(_) => println!("Configuration file is valid: {path}"),
                Err(e) => {
                    println!("Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Env => {
            config::env::print_env_help();
        }
    }

    Ok(())
}
