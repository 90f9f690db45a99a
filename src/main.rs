//! Command line front end: reads event logs and prints profile reports
//!
//! Run with: cargo run --bin profile-cli -- host0.json host1.json

use std::fs;
use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use dataflow_profile::config::{Cli, Config, DotTarget, OutputFormat, DEFAULT_LOG_FILTER};
use dataflow_profile::core::EventStore;
use dataflow_profile::render::Report;
use dataflow_profile::service::SnapshotService;

fn emit(store: &EventStore, config: &Config) -> anyhow::Result<()> {
    let report = Report::build(store, &config.report_options())?;

    let mut stdout = std::io::stdout().lock();
    match &config.dot {
        Some(DotTarget::File(path)) => fs::write(path, &report.graph.dot)
            .with_context(|| format!("writing graph to {}", path.display()))?,
        Some(DotTarget::Stdout) => stdout.write_all(report.graph.dot.as_bytes())?,
        None => {}
    }

    match config.format {
        OutputFormat::Text => write!(stdout, "{}", report.to_text())?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(stdout)?;
        }
        OutputFormat::Result => write!(stdout, "{}", report.to_result_lines())?,
    }
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_cli(Cli::parse())?;
    info!(inputs = config.inputs.len(), bucket_ms = config.bucket_ms, "Loading event logs");

    let service = SnapshotService::start(config.inputs.clone()).await?;
    emit(&service.current(), &config)?;

    let Some(period) = config.watch else {
        return Ok(());
    };

    info!(secs = period.as_secs(), "Watching inputs, Ctrl+C to stop");
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.refresh().await {
                    Ok(store) => emit(&store, &config)?,
                    Err(e) => error!(error = %e, "Refresh failed, keeping previous snapshot"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}
