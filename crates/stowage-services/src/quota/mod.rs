//! Per-tenant storage usage computed from live references.
//!
//! Usage is never stored. Each computation lists the tenant's content rows,
//! extracts every referenced object, deduplicates the keys and issues one
//! metadata fetch per key. Cost is linear in the number of referenced objects;
//! [`CachedQuotaManager`] trades freshness for fewer backend calls.

#[cfg(feature = "quota-cache")]
mod cached;

#[cfg(feature = "quota-cache")]
pub use cached::CachedQuotaManager;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use stowage_core::{
    format_bytes, AppError, ExtractionFailurePolicy, QuotaSnapshot, ReferenceExtractor,
};
use stowage_db::ContentStore;
use stowage_storage::Storage;

/// Storage keys referenced by a tenant's content.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    pub keys: BTreeSet<String>,
    /// Rows whose structured body could not be parsed.
    pub unresolved_rows: Vec<i64>,
}

impl ReferenceSet {
    fn merge(&mut self, other: ReferenceSet) {
        self.keys.extend(other.keys);
        self.unresolved_rows.extend(other.unresolved_rows);
    }
}

/// Usage snapshot plus the bookkeeping behind it.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStats {
    #[serde(flatten)]
    pub snapshot: QuotaSnapshot,
    pub referenced_objects: usize,
    /// Referenced keys with no live object behind them.
    pub missing_objects: usize,
    /// Referenced keys whose metadata fetch failed for another reason.
    pub failed_lookups: usize,
    pub unresolved_rows: usize,
    pub used_display: String,
    pub limit_display: String,
    #[serde(skip)]
    unresolved_row_ids: Vec<i64>,
}

impl QuotaStats {
    fn new(
        used_bytes: u64,
        limit_bytes: u64,
        referenced_objects: usize,
        missing_objects: usize,
        failed_lookups: usize,
        unresolved_row_ids: Vec<i64>,
    ) -> Self {
        Self {
            snapshot: QuotaSnapshot::new(used_bytes, limit_bytes),
            referenced_objects,
            missing_objects,
            failed_lookups,
            unresolved_rows: unresolved_row_ids.len(),
            used_display: format_bytes(used_bytes),
            limit_display: format_bytes(limit_bytes),
            unresolved_row_ids,
        }
    }

    /// Whether the snapshot may undercount real usage.
    pub fn is_indeterminate(&self) -> bool {
        self.unresolved_rows > 0 || self.failed_lookups > 0
    }
}

/// Quota operations shared by the plain and the cached manager.
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn stats(&self, tenant_id: &str) -> Result<QuotaStats, AppError>;

    fn extraction_policy(&self) -> ExtractionFailurePolicy;

    /// Drop any cached usage for a tenant after a write.
    async fn invalidate(&self, _tenant_id: &str) {}

    async fn usage(&self, tenant_id: &str) -> Result<QuotaSnapshot, AppError> {
        Ok(self.stats(tenant_id).await?.snapshot)
    }

    /// Deny when `used + incoming > limit`. Reaching the limit exactly is
    /// allowed. Under `FailClosed`, an indeterminate snapshot is also denied.
    async fn check_quota(
        &self,
        tenant_id: &str,
        incoming_bytes: u64,
    ) -> Result<QuotaSnapshot, AppError> {
        let stats = self.stats(tenant_id).await?;
        decide(&stats, incoming_bytes, self.extraction_policy())
    }
}

fn decide(
    stats: &QuotaStats,
    incoming_bytes: u64,
    policy: ExtractionFailurePolicy,
) -> Result<QuotaSnapshot, AppError> {
    if policy == ExtractionFailurePolicy::FailClosed {
        if let Some(content_id) = stats.unresolved_row_ids.first() {
            return Err(AppError::ReferenceExtraction {
                content_id: *content_id,
                message: format!(
                    "{} content row(s) could not be parsed; usage is indeterminate",
                    stats.unresolved_rows
                ),
            });
        }
        if stats.failed_lookups > 0 {
            return Err(AppError::StorageBackend {
                key: None,
                message: format!(
                    "{} object size lookup(s) failed; usage is indeterminate",
                    stats.failed_lookups
                ),
            });
        }
    }

    if stats.snapshot.admits(incoming_bytes) {
        Ok(stats.snapshot)
    } else {
        Err(AppError::QuotaExceeded {
            snapshot: stats.snapshot,
            incoming_bytes,
        })
    }
}

/// Uncached quota computation. Always reflects the backend at call time.
#[derive(Clone)]
pub struct QuotaManager {
    content: Arc<dyn ContentStore>,
    storage: Arc<dyn Storage>,
    extractor: ReferenceExtractor,
    limit_bytes: u64,
    policy: ExtractionFailurePolicy,
}

impl QuotaManager {
    pub fn new(
        content: Arc<dyn ContentStore>,
        storage: Arc<dyn Storage>,
        limit_bytes: u64,
        policy: ExtractionFailurePolicy,
    ) -> Self {
        Self {
            content,
            storage,
            extractor: ReferenceExtractor::new(),
            limit_bytes,
            policy,
        }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Every storage key referenced by the tenant's content. URLs that do not
    /// point into the configured backend are skipped.
    #[tracing::instrument(skip(self), fields(tenant.id = %tenant_id))]
    pub async fn referenced_keys(&self, tenant_id: &str) -> Result<ReferenceSet, AppError> {
        let rows = self.content.list_tenant_content(tenant_id).await?;
        let mut set = ReferenceSet::default();

        for row in &rows {
            let refs = self.extractor.extract(row);
            if refs.tree_error.is_some() {
                set.unresolved_rows.push(refs.content_id);
            }
            set.keys.extend(
                refs.urls
                    .iter()
                    .filter_map(|url| self.storage.key_from_url(url)),
            );
        }

        tracing::debug!(
            rows = rows.len(),
            keys = set.keys.len(),
            unresolved_rows = set.unresolved_rows.len(),
            "Collected referenced keys"
        );
        Ok(set)
    }

    /// Union of the references of every tenant.
    #[tracing::instrument(skip(self))]
    pub async fn referenced_keys_all_tenants(&self) -> Result<ReferenceSet, AppError> {
        let mut set = ReferenceSet::default();
        for tenant_id in self.content.list_tenant_ids().await? {
            set.merge(self.referenced_keys(&tenant_id).await?);
        }
        Ok(set)
    }
}

#[async_trait]
impl QuotaProvider for QuotaManager {
    #[tracing::instrument(skip(self), fields(tenant.id = %tenant_id))]
    async fn stats(&self, tenant_id: &str) -> Result<QuotaStats, AppError> {
        let references = self.referenced_keys(tenant_id).await?;

        let mut used_bytes = 0u64;
        let mut missing = 0usize;
        let mut failed = 0usize;
        for key in &references.keys {
            match self.storage.head(key).await {
                Ok(info) => used_bytes = used_bytes.saturating_add(info.size),
                Err(e) if e.is_not_found() => missing += 1,
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Failed to read object size");
                    failed += 1;
                }
            }
        }

        if !references.unresolved_rows.is_empty() {
            tracing::warn!(
                unresolved_rows = references.unresolved_rows.len(),
                policy = ?self.policy,
                "Usage excludes tree references of unparsable rows"
            );
        }

        Ok(QuotaStats::new(
            used_bytes,
            self.limit_bytes,
            references.keys.len(),
            missing,
            failed,
            references.unresolved_rows,
        ))
    }

    fn extraction_policy(&self) -> ExtractionFailurePolicy {
        self.policy
    }
}
