use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stowage_core::policy::RATE_WINDOW;
use stowage_infra::InMemoryRateLimitStore;
use tokio::time::interval;

use super::ReclaimSweeper;

/// In-process trigger for the temp sweep, for deployments without an external
/// cron. Also evicts idle entries from the in-memory rate limit store.
pub struct SweepScheduler {
    sweeper: Arc<ReclaimSweeper>,
    interval: Duration,
    rate_limits: Option<InMemoryRateLimitStore>,
}

impl SweepScheduler {
    pub fn new(sweeper: Arc<ReclaimSweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval,
            rate_limits: None,
        }
    }

    pub fn with_rate_limit_store(mut self, store: InMemoryRateLimitStore) -> Self {
        self.rate_limits = Some(store);
        self
    }

    /// Start the background loop. The first tick fires immediately.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);

            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    pub async fn run_once(&self) {
        tracing::info!("Starting scheduled temp sweep");
        let report = self.sweeper.sweep_temp().await;
        if report.failures.is_empty() {
            tracing::info!(deleted = report.deleted, "Scheduled temp sweep completed");
        } else {
            tracing::error!(
                deleted = report.deleted,
                failed = report.failures.len(),
                "Scheduled temp sweep completed with failures"
            );
        }

        if let Some(store) = &self.rate_limits {
            let now = Utc::now();
            let window = chrono::Duration::from_std(RATE_WINDOW)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            store.evict_idle(now, now - window).await;
        }
    }
}
