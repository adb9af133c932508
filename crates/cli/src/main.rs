//! gleaner: batch scheduler for the worker fleet.
//!
//! Loads `gleaner.toml` (scheduler parameters plus the simulated world),
//! then drives the batch loop until Ctrl-C or the batch limit. CLI flags
//! override the corresponding config fields.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use gleaner_core::config::{load_dotenv, GleanerConfig};
use gleaner_game::{RateSelector, SimWorld};
use gleaner_sched::Runner;

// ── CLI ─────────────────────────────────────────────────────────────

/// Continuous four-stage batch scheduling against a target pool.
#[derive(Parser, Debug)]
#[command(name = "gleaner", version, about)]
struct Cli {
    /// Path to the gleaner.toml config file.
    #[arg(long, env = "GLEANER_CONFIG", default_value = "gleaner.toml")]
    config: String,

    /// Override the candidate target list (comma separated).
    #[arg(long, value_delimiter = ',')]
    targets: Option<Vec<String>>,

    /// Capacity units always left free on the primary node.
    #[arg(long, env = "GLEANER_RESERVE_PRIMARY")]
    reserve_primary: Option<f64>,

    /// Fraction of free capacity left alone on secondary nodes.
    #[arg(long, env = "GLEANER_RESERVE_SECONDARY_FRACTION")]
    reserve_secondary_fraction: Option<f64>,

    /// Stop after this many dispatched batches.
    #[arg(long, env = "GLEANER_BATCH_LIMIT")]
    batch_limit: Option<u64>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match GleanerConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded config");
            cfg
        }
        Err(e) => {
            warn!(error = %e, path = %cli.config, "failed to load config, using local defaults");
            GleanerConfig::local()
        }
    };

    if let Some(targets) = cli.targets {
        config.scheduler.targets = targets;
    }
    if let Some(reserve) = cli.reserve_primary {
        config.scheduler.primary_reserve = reserve;
    }
    if let Some(fraction) = cli.reserve_secondary_fraction {
        config.scheduler.secondary_reserve_fraction = fraction;
    }
    if let Some(limit) = cli.batch_limit {
        config.scheduler.batch_limit = Some(limit);
    }
    config
        .validate()
        .context("config failed validation after CLI overrides")?;
    config.log_summary();

    let world = Arc::new(SimWorld::from_config(
        &config.sim,
        config.scheduler.cost_per_thread,
    ));
    let runner = Runner::new(world, Arc::new(RateSelector), config.scheduler);

    // Ctrl-C stops the loop between (or mid-) sleeps.
    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.notify_one();
        }
    });

    runner.run().await;
    info!("gleaner exited cleanly");
    Ok(())
}
