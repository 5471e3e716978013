//! Check command - prove the configured database is usable through the manager
//!
//! Builds one manager from the config, takes `--concurrency` leases at once,
//! runs `SELECT 1` on each, prints the pool status and shuts the pool down.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use poolward_core::{AppConfig, ConnectionManager, ManagerStatus, PgBackend, ShutdownPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Lease connections through the pool manager and run a round-trip on each")]
pub struct CheckArgs {
    /// Number of leases to take concurrently
    #[arg(long, short = 'n', default_value = "1")]
    pub concurrency: usize,

    /// Give up on a single lease after this many milliseconds
    #[arg(long, default_value = "10000")]
    pub timeout_ms: u64,

    /// Session label for the leases (overrides the config)
    #[arg(long)]
    pub application_name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    leases_ok: usize,
    leases_failed: usize,
    elapsed_ms: u64,
    status: ManagerStatus,
}

pub async fn run_check(args: CheckArgs, config: AppConfig) -> Result<()> {
    if args.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let manager = Arc::new(build_manager(&config, args.application_name));
    let patience = Duration::from_millis(args.timeout_ms);

    info!(
        concurrency = args.concurrency,
        host = %config.database.host,
        database = %config.database.database,
        "starting connectivity check"
    );

    let started = Instant::now();
    let leases = (0..args.concurrency).map(|_| {
        let manager = Arc::clone(&manager);
        async move {
            let mut lease = manager.acquire_timeout(patience).await?;
            let value: i32 = sqlx::query_scalar("SELECT 1")
                .fetch_one(&mut **lease)
                .await
                .context("round-trip on leased connection failed")?;
            anyhow::ensure!(value == 1, "round-trip returned {}", value);
            Ok::<_, anyhow::Error>(())
        }
    });
    let results = join_all(leases).await;
    let elapsed = started.elapsed();
    let status = manager.status();
    manager.shutdown().await;
    anyhow::ensure!(!manager.is_ready(), "pool still published after shutdown");

    let mut first_error = None;
    let mut failed = 0;
    for result in results {
        if let Err(err) = result {
            warn!(error = %err, "lease failed");
            failed += 1;
            first_error.get_or_insert(err);
        }
    }

    let report = CheckReport {
        leases_ok: args.concurrency - failed,
        leases_failed: failed,
        elapsed_ms: elapsed.as_millis() as u64,
        status,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match first_error {
        Some(err) => Err(err.context(format!(
            "{} of {} leases failed",
            report.leases_failed, args.concurrency
        ))),
        None => Ok(()),
    }
}

/// The process exits right after `check`, so the pool is drained and closed
/// before returning instead of in a background task.
fn build_manager(
    config: &AppConfig,
    application_name: Option<String>,
) -> ConnectionManager<PgBackend> {
    let mut manager =
        ConnectionManager::from_app_config(config).shutdown_policy(ShutdownPolicy::Drain);
    if let Some(name) = application_name {
        manager = manager.application_name(name);
    }
    manager
}

fn print_report(report: &CheckReport) {
    let mark = if report.leases_failed == 0 { "✓" } else { "✗" };
    println!(
        "{} {} ok, {} failed in {}ms",
        mark, report.leases_ok, report.leases_failed, report.elapsed_ms
    );
    println!(
        "  pool generation {}, {} open / {} idle connections",
        report.status.generation, report.status.open_connections, report.status.idle_connections
    );
}
