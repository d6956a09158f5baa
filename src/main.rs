//! pizzeria: a simulated robotic pizza production line.
//!
//! Loads a kitchen topology, runs the production line for a fixed duration
//! (or until interrupted), and prints a final report of order states and
//! quality scores.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pizzeria::config::{Config, StationConfig};
use pizzeria::error::{AddressParseSnafu, ConfigSnafu, KitchenError, MetricsSnafu};
use pizzeria::kitchen::run_kitchen;

/// Robotic pizza production line simulator.
#[derive(Parser, Debug)]
#[command(name = "pizzeria")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology file (YAML or JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// How many seconds to run before stopping the line.
    #[arg(long, default_value_t = 80)]
    duration: u64,

    /// Dry run - validate configuration without running.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), KitchenError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("pizzeria starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        pizzeria::metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        for station in &config.kitchen {
            match station {
                StationConfig::Robot {
                    count,
                    operations,
                    after_oven,
                    ..
                } => {
                    let side = if *after_oven { "after" } else { "before" };
                    info!("  - {count} robot(s) {side} the oven: {operations:?}");
                }
                StationConfig::Oven { count } => info!("  - {count} oven(s)"),
                StationConfig::CameraSystem { operations } => {
                    info!("  - cameras on: {operations:?}");
                }
            }
        }
        info!("Commands place {} order(s)", config.total_ordered());
        info!("Configuration is valid");
        return Ok(());
    }

    let ordered = config.total_ordered();
    let report = run_kitchen(config, Duration::from_secs(args.duration)).await?;

    info!("Production line stopped");
    info!("  Orders placed: {ordered}");
    println!("{report}");

    Ok(())
}
