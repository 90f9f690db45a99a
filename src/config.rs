//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::core::DEFAULT_BUCKET_MS;
use crate::render::ReportOptions;

pub const ENV_BUCKET_MS: &str = "DATAFLOW_PROFILE_BUCKET_MS";
pub const ENV_FORMAT: &str = "DATAFLOW_PROFILE_FORMAT";

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info,dataflow_profile=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned plain-text tables
    Text,
    /// One JSON document with every view
    Json,
    /// RESULT lines for plotting tools
    Result,
}

#[derive(Debug, Parser)]
#[command(name = "profile-cli")]
#[command(version, about = "Profile reports from dataflow event logs", long_about = None)]
pub struct Cli {
    /// Event log files, one per host
    #[arg(value_name = "INPUTS")]
    pub inputs: Vec<PathBuf>,

    /// Time series bucket width in milliseconds
    #[arg(long, env = ENV_BUCKET_MS, default_value_t = DEFAULT_BUCKET_MS)]
    pub bucket_ms: f64,

    /// Write the operator graph as Graphviz DOT ("-" for stdout)
    #[arg(long, value_name = "PATH")]
    pub dot: Option<PathBuf>,

    /// Output format
    #[arg(long, env = ENV_FORMAT, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Report title, defaults to the program name found in the log
    #[arg(long)]
    pub title: Option<String>,

    /// Include per-instance stream and file tables
    #[arg(long)]
    pub detail: bool,

    /// Re-read the inputs every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no input files given")]
    NoInputs,

    #[error("--bucket-ms must be a positive number, got {0}")]
    InvalidBucket(f64),

    #[error("--watch interval must be at least one second")]
    InvalidWatch,
}

/// Where the DOT graph goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotTarget {
    Stdout,
    File(PathBuf),
}

/// Validated run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub bucket_ms: f64,
    pub dot: Option<DotTarget>,
    pub format: OutputFormat,
    pub title: Option<String>,
    pub detail: bool,
    pub watch: Option<Duration>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        if !(cli.bucket_ms.is_finite() && cli.bucket_ms > 0.0) {
            return Err(ConfigError::InvalidBucket(cli.bucket_ms));
        }
        let watch = match cli.watch {
            Some(0) => return Err(ConfigError::InvalidWatch),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };
        let dot = cli.dot.map(|path| {
            if path.as_os_str() == "-" {
                DotTarget::Stdout
            } else {
                DotTarget::File(path)
            }
        });

        Ok(Self {
            inputs: cli.inputs,
            bucket_ms: cli.bucket_ms,
            dot,
            format: cli.format,
            title: cli.title,
            detail: cli.detail,
            watch,
        })
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            title: self.title.clone(),
            bucket_ms: self.bucket_ms,
            detail: self.detail,
        }
    }
}
