//! Operator commands for the scheduled and manual reclaim jobs.

use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "stowage", about = "Stowage storage lifecycle operations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Delete temp objects older than TEMP_TTL_HOURS
    SweepTemp,
    /// Delete temp-layout objects under one prefix older than the given TTL
    SweepPrefix {
        prefix: String,
        /// Overrides TEMP_TTL_HOURS
        #[arg(long)]
        ttl_hours: Option<u64>,
    },
    /// Count, size and age of temp objects per prefix
    TempStats,
    /// Report permanent objects no content row references. Never deletes.
    OrphanReport {
        #[arg(long)]
        tenant: String,
        /// Key prefix to list, e.g. `image/` or `tenants/center-1/`
        #[arg(long)]
        prefix: String,
        /// Resume after this key
        #[arg(long, conflicts_with = "all")]
        start_after: Option<String>,
        /// Drain every page instead of returning one
        #[arg(long)]
        all: bool,
    },
    /// Tenant usage against its quota
    Quota {
        #[arg(long)]
        tenant: String,
    },
}

pub fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stowage=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orphan_report() {
        let cli = Cli::try_parse_from([
            "stowage",
            "orphan-report",
            "--tenant",
            "center-1",
            "--prefix",
            "image/",
            "--start-after",
            "image/2024/05/a.png",
        ])
        .unwrap();
        match cli.command {
            Commands::OrphanReport {
                tenant,
                prefix,
                start_after,
                all,
            } => {
                assert_eq!(tenant, "center-1");
                assert_eq!(prefix, "image/");
                assert_eq!(start_after.as_deref(), Some("image/2024/05/a.png"));
                assert!(!all);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_all_conflicts_with_cursor() {
        let parsed = Cli::try_parse_from([
            "stowage",
            "orphan-report",
            "--tenant",
            "t",
            "--prefix",
            "image/",
            "--start-after",
            "k",
            "--all",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_sweep_prefix_ttl_override() {
        let cli =
            Cli::try_parse_from(["stowage", "sweep-prefix", "image/temp/", "--ttl-hours", "2"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::SweepPrefix { ref prefix, ttl_hours: Some(2) } if prefix == "image/temp/"
        ));
        assert_eq!(hours(2), Duration::from_secs(7200));
    }
}
