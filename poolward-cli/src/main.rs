//! poolward CLI - operate the PostgreSQL connection pool manager
//!
//! - Connectivity and concurrency check through the manager (`check`)
//! - Config file scaffolding and inspection (`config`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "poolward",
    author,
    version,
    about = "Lazily built, health-checked PostgreSQL connection pool manager",
    long_about = "Build a PostgreSQL pool on first use, validate it with a SELECT 1 probe, \
                  and lease connections from it with an optional session label."
)]
struct Cli {
    /// Config file (default: ~/.poolward/config.toml when present)
    #[arg(long, short = 'c', global = true, env = "POOLWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lease connections through the manager and run a round-trip on each
    Check(commands::check::CheckArgs),
    /// Manage poolward configuration (init, show, path)
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_handle = tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        ..TracingConfig::default()
    })
    .ok();

    match cli.command {
        Commands::Check(args) => {
            let app_config = config::load(cli.config.as_deref())?;
            if let Some(log_handle) = &log_handle {
                log_handle.apply(&TracingConfig {
                    debug: cli.debug,
                    level: app_config.logging.level.clone(),
                })?;
            }
            commands::run_check(args, app_config).await?
        }
        Commands::Config(args) => config::run_config(args, cli.config.as_deref())?,
    }
    Ok(())
}
