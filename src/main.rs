//! Trade Reconciliation
//!
//! A tool for matching a source trade feed against a target feed and writing
//! the matched pairs as a JSON document.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trade_recon::{run_mapping, Config, DEFAULT_CONFIG_PATH};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "trade-recon")]
#[command(about = "Reconcile a source trade feed against a target feed", long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run only this mapping (e.g., "efx_to_ibdl"); all mappings by default
    #[arg(short, long, value_name = "NAME")]
    mapping: Option<String>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("Reconciliation failed: {:#}", e);
        return Err(e);
    }

    info!("Reconciliation completed successfully!");
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    info!("Loading configuration from {:?}", args.config);
    let config = Config::from_file(&args.config)
        .context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let selected: Vec<_> = match &args.mapping {
        Some(name) => {
            let mapping = config.find_mapping(name)
                .context(format!("Mapping '{}' not found in configuration", name))?;
            vec![(name.as_str(), mapping)]
        }
        None => config.mappings.iter().map(|(name, m)| (name.as_str(), m)).collect(),
    };

    for (name, mapping) in selected {
        let summary = run_mapping(name, mapping)
            .context(format!("Mapping '{}' failed", name))?;
        info!(
            "Mapping {}: {} source rows, {} target rows, {} primary + {} block matches, {} records written",
            name,
            summary.source_rows,
            summary.target_rows,
            summary.primary_matches,
            summary.block_matches,
            summary.records_written
        );
    }

    Ok(())
}
