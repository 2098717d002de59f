//! Faultgen command line

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faultgen::config::{Config, RunMode};
use faultgen::{inspect, runner};
use faultgen_packer::ComplianceOracle;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "faultgen")]
#[command(about = "Synthetic readout packet generator with fault injection")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "FAULTGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configured one
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Generate packets or check reported diagnostics
    Run {
        #[arg(long, value_enum)]
        mode: Option<RunMode>,

        /// Number of events, overriding the configured count
        #[arg(long)]
        events: Option<u32>,
    },
    /// List the fault scenarios
    Scenarios,
    /// List diagnostics no configured event exercises
    Coverage,
    /// Decode a packet file
    Inspect {
        file: PathBuf,

        /// Only show this event
        #[arg(long)]
        event: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { force } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), None)?;
            let path = cli.config.unwrap_or_else(Config::default_config_path);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration already exists: {}\nUse --force to overwrite it",
                    path.display()
                );
            }
            let config = Config::create_default(Some(path), None)?;
            info!("Configuration written to {}", config.config_path().display());
        }
        Command::Scenarios => {
            for line in inspect::catalogue() {
                println!("{}", line);
            }
        }
        Command::Inspect { file, event } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), None)?;
            print!("{}", inspect::inspect_file(&file, event)?);
        }
        Command::Run { mode, events } => {
            let config = load_with_logging(cli.config, cli.log_level.as_deref())?;
            let events = events.unwrap_or(config.run.events);
            match mode.unwrap_or(config.mode) {
                RunMode::Generate => {
                    runner::generate(&config, events)?;
                }
                RunMode::Check => {
                    let summary = runner::check(&config, events)?;
                    println!(
                        "{} events checked, {} passed",
                        summary.checked, summary.passed
                    );
                }
            }
        }
        Command::Coverage => {
            let config = load_with_logging(cli.config, cli.log_level.as_deref())?;
            let matrix = config
                .fault_matrix()
                .context("Invalid fault configuration")?;
            let untested = ComplianceOracle::from_matrix(&matrix).coverage_report();
            if untested.is_empty() {
                println!("Every diagnostic is exercised");
            }
            for name in untested {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn load_with_logging(path: Option<PathBuf>, level: Option<&str>) -> Result<Config> {
    let config = Config::load(path)?;
    init_logging(
        level.unwrap_or(&config.logging.level),
        config.logging.file.as_deref(),
    )?;
    info!("Loaded configuration from {}", config.config_path().display());
    Ok(config)
}

/// `RUST_LOG` takes precedence over `level`
fn init_logging(level: &str, file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => fmt().with_env_filter(env_filter).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
