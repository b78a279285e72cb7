//! Stowage CLI: the entry points an external scheduler invokes.
//!
//! Reads the same environment as the API (DATABASE_URL, STORAGE_BACKEND, ...)
//! and prints every result as JSON on stdout.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use stowage_cli::{hours, init_tracing, Cli, Commands};
use stowage_core::Config;
use stowage_db::{AttachmentRepository, ContentRepository};
use stowage_services::{create_storage, OrphanCursor, StowageServices, SweepReport};

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Print the report, then fail the process when any object was left behind so
/// cron surfaces it.
fn finish_sweep(report: &SweepReport) -> anyhow::Result<()> {
    print_json(report)?;
    if !report.failures.is_empty() {
        anyhow::bail!("Sweep finished with {} failures", report.failures.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let pool = stowage_db::setup_database(&config).await?;
    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;
    let services = StowageServices::build(
        &config,
        storage,
        Arc::new(AttachmentRepository::new(pool.clone())),
        Arc::new(ContentRepository::new(pool)),
    );

    match cli.command {
        Commands::SweepTemp => {
            let report = services.sweeper.sweep_temp().await;
            finish_sweep(&report)?;
        }
        Commands::SweepPrefix { prefix, ttl_hours } => {
            let ttl = ttl_hours.map(hours).unwrap_or_else(|| config.temp_ttl());
            let report = services.sweeper.sweep_prefix(&prefix, ttl).await;
            finish_sweep(&report)?;
        }
        Commands::TempStats => {
            let stats = services.sweeper.temp_stats().await?;
            print_json(&stats)?;
        }
        Commands::OrphanReport {
            tenant,
            prefix,
            start_after,
            all,
        } => {
            let page = if all {
                services.sweeper.orphan_report_all(&tenant, &prefix).await?
            } else {
                let cursor = start_after.map(|start_after| OrphanCursor { start_after });
                services
                    .sweeper
                    .orphan_report(&tenant, &prefix, cursor)
                    .await?
            };
            if page.unresolved_rows > 0 {
                tracing::warn!(
                    unresolved_rows = page.unresolved_rows,
                    "Some content rows could not be parsed; orphans may be referenced"
                );
            }
            print_json(&page)?;
        }
        Commands::Quota { tenant } => {
            let stats = services.quota.stats(&tenant).await?;
            print_json(&stats)?;
        }
    }

    Ok(())
}
