//! Assembly of the service graph from configuration.

use std::sync::Arc;
use stowage_core::Config;
use stowage_db::{AttachmentStore, ContentStore};
use stowage_infra::{InMemoryRateLimitStore, IpRateLimiter};
use stowage_storage::{KeyLayout, Storage};

use crate::attachment::AttachmentService;
use crate::gate::SecurityGate;
use crate::limits::UserUploadLimiter;
use crate::optimize::ImageOptimizer;
use crate::quota::{QuotaManager, QuotaProvider};
use crate::staging::StagingStore;
use crate::sweeper::{ReclaimSweeper, SweepScheduler};
use crate::upload::UploadService;
use crate::validation::{ContentScanner, FileValidator};

/// Every service sharing one storage backend and one pair of stores.
#[derive(Clone)]
pub struct StowageServices {
    pub storage: Arc<dyn Storage>,
    pub staging: StagingStore,
    pub quota_manager: QuotaManager,
    /// The manager callers should use; cached when `QUOTA_CACHE_TTL_SECS` is set.
    pub quota: Arc<dyn QuotaProvider>,
    pub uploads: UploadService,
    pub attachments: AttachmentService,
    pub sweeper: Arc<ReclaimSweeper>,
    pub rate_limit_store: InMemoryRateLimitStore,
}

impl StowageServices {
    pub fn build(
        config: &Config,
        storage: Arc<dyn Storage>,
        attachments: Arc<dyn AttachmentStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        let layout = KeyLayout::new(config.tenant_scoped_keys());
        let staging = StagingStore::new(storage.clone(), layout);

        let quota_manager = QuotaManager::new(
            content,
            storage.clone(),
            config.quota_limit_bytes(),
            config.quota_extraction_policy(),
        );
        let quota = Self::quota_provider(config, &quota_manager);

        let rate_limit_store = InMemoryRateLimitStore::new();
        let gate = SecurityGate::new(
            IpRateLimiter::new(
                Arc::new(rate_limit_store.clone()),
                config.ip_rate_limit().clone(),
            ),
            FileValidator::new(),
            UserUploadLimiter::new(attachments.clone()),
        );

        let uploads = UploadService::new(
            gate,
            quota.clone(),
            staging.clone(),
            ContentScanner::new(config.content_scan()),
            Self::optimizer(),
        );
        let attachment_service = AttachmentService::new(
            attachments,
            staging.clone(),
            quota.clone(),
            config.download_url_ttl(),
        );
        let sweeper = Arc::new(
            ReclaimSweeper::new(storage.clone(), quota_manager.clone(), layout, config.temp_ttl())
                .with_batching(config.sweep_batch_size(), config.list_page_size()),
        );

        Self {
            storage,
            staging,
            quota_manager,
            quota,
            uploads,
            attachments: attachment_service,
            sweeper,
            rate_limit_store,
        }
    }

    /// Scheduler running the temp sweep every `SWEEP_INTERVAL_SECS`.
    pub fn sweep_scheduler(&self, config: &Config) -> SweepScheduler {
        SweepScheduler::new(self.sweeper.clone(), config.sweep_interval())
            .with_rate_limit_store(self.rate_limit_store.clone())
    }

    #[cfg(feature = "quota-cache")]
    fn quota_provider(config: &Config, manager: &QuotaManager) -> Arc<dyn QuotaProvider> {
        match config.quota_cache_ttl() {
            Some(ttl) => {
                tracing::info!(ttl_secs = ttl.as_secs(), "Quota cache enabled");
                Arc::new(crate::quota::CachedQuotaManager::new(
                    Arc::new(manager.clone()),
                    ttl,
                ))
            }
            None => Arc::new(manager.clone()),
        }
    }

    #[cfg(not(feature = "quota-cache"))]
    fn quota_provider(config: &Config, manager: &QuotaManager) -> Arc<dyn QuotaProvider> {
        if config.quota_cache_ttl().is_some() {
            tracing::warn!("QUOTA_CACHE_TTL_SECS is set but the quota-cache feature is disabled");
        }
        Arc::new(manager.clone())
    }

    #[cfg(feature = "image")]
    fn optimizer() -> Arc<dyn ImageOptimizer> {
        Arc::new(crate::optimize::ResizeOptimizer)
    }

    #[cfg(not(feature = "image"))]
    fn optimizer() -> Arc<dyn ImageOptimizer> {
        Arc::new(crate::optimize::NoopOptimizer)
    }
}
