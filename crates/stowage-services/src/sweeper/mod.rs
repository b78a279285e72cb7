//! Reclaim jobs: TTL deletion of stale temp objects and the report-only orphan
//! finder. Neither runs on the request path.

mod scheduler;

pub use scheduler::SweepScheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stowage_core::AppError;
use stowage_storage::keys::{is_permanent_key, is_temp_key};
use stowage_storage::{KeyLayout, ObjectInfo, Storage};

use crate::quota::{QuotaManager, ReferenceSet};

/// An object the sweep could not delete, or a prefix it could not list.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TempPrefixStats {
    pub prefix: String,
    pub count: usize,
    pub total_bytes: u64,
    pub expired: usize,
    pub oldest: Option<DateTime<Utc>>,
}

/// Resume point of a paginated orphan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCursor {
    pub start_after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrphanReportPage {
    pub orphans: Vec<ObjectInfo>,
    pub scanned: usize,
    /// Rows whose references could not be extracted. When non-zero, some listed
    /// orphans may in fact be referenced.
    pub unresolved_rows: usize,
    pub next_cursor: Option<OrphanCursor>,
}

#[derive(Clone)]
pub struct ReclaimSweeper {
    storage: Arc<dyn Storage>,
    quota: QuotaManager,
    layout: KeyLayout,
    temp_ttl: Duration,
    batch_size: usize,
    page_size: usize,
}

impl ReclaimSweeper {
    pub fn new(
        storage: Arc<dyn Storage>,
        quota: QuotaManager,
        layout: KeyLayout,
        temp_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            quota,
            layout,
            temp_ttl,
            batch_size: 1000,
            page_size: 1000,
        }
    }

    /// Delete chunk size and listing page size. Zero is treated as one.
    pub fn with_batching(mut self, batch_size: usize, page_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.page_size = page_size.max(1);
        self
    }

    pub fn temp_ttl(&self) -> Duration {
        self.temp_ttl
    }

    pub async fn sweep_temp(&self) -> SweepReport {
        self.sweep_temp_at(Utc::now()).await
    }

    /// Delete every temp object last modified more than the TTL before `now`.
    /// Failures are collected per object and never stop the sweep.
    #[tracing::instrument(skip(self, now), fields(cleanup.operation = "sweep_temp"))]
    pub async fn sweep_temp_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for prefix in self.layout.temp_scan_prefixes() {
            report.merge(self.sweep_prefix_at(&prefix, self.temp_ttl, now).await);
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failures.len(),
            "Temp sweep completed"
        );
        report
    }

    pub async fn sweep_prefix(&self, prefix: &str, ttl: Duration) -> SweepReport {
        self.sweep_prefix_at(prefix, ttl, Utc::now()).await
    }

    /// Sweep one prefix. Only keys with the temp layout are ever deleted,
    /// whatever the prefix.
    #[tracing::instrument(skip(self, ttl, now), fields(cleanup.prefix = %prefix))]
    pub async fn sweep_prefix_at(
        &self,
        prefix: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = cutoff(now, ttl);
        let mut start_after: Option<String> = None;

        loop {
            let page = match self
                .storage
                .list_page(prefix, start_after.as_deref(), self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(error = %e, prefix = %prefix, "Failed to list temp objects");
                    report.failures.push(SweepFailure {
                        key: prefix.to_string(),
                        error: e.to_string(),
                    });
                    break;
                }
            };

            report.scanned += page.objects.len();
            let expired: Vec<String> = page
                .objects
                .iter()
                .filter(|o| is_temp_key(&o.key) && o.last_modified < cutoff)
                .map(|o| o.key.clone())
                .collect();

            for chunk in expired.chunks(self.batch_size) {
                let failures = self.storage.delete_many(chunk).await;
                report.deleted += chunk.len() - failures.len();
                for (key, e) in failures {
                    tracing::warn!(error = %e, key = %key, "Failed to delete expired temp object");
                    report.failures.push(SweepFailure {
                        key,
                        error: e.to_string(),
                    });
                }
            }

            match page.next_start_after {
                Some(next) => start_after = Some(next),
                None => break,
            }
        }

        report
    }

    pub async fn temp_stats(&self) -> Result<Vec<TempPrefixStats>, AppError> {
        self.temp_stats_at(Utc::now()).await
    }

    /// Count and size of temp objects per scanned prefix.
    pub async fn temp_stats_at(&self, now: DateTime<Utc>) -> Result<Vec<TempPrefixStats>, AppError> {
        let cutoff = cutoff(now, self.temp_ttl);
        let mut stats = Vec::new();

        for prefix in self.layout.temp_scan_prefixes() {
            let mut entry = TempPrefixStats {
                prefix: prefix.clone(),
                count: 0,
                total_bytes: 0,
                expired: 0,
                oldest: None,
            };
            let mut start_after: Option<String> = None;
            loop {
                let page = self
                    .storage
                    .list_page(&prefix, start_after.as_deref(), self.page_size)
                    .await
                    .map_err(|e| AppError::storage(prefix.clone(), e))?;

                for object in page.objects.iter().filter(|o| is_temp_key(&o.key)) {
                    entry.count += 1;
                    entry.total_bytes += object.size;
                    if object.last_modified < cutoff {
                        entry.expired += 1;
                    }
                    if entry.oldest.map_or(true, |oldest| object.last_modified < oldest) {
                        entry.oldest = Some(object.last_modified);
                    }
                }

                match page.next_start_after {
                    Some(next) => start_after = Some(next),
                    None => break,
                }
            }
            stats.push(entry);
        }

        Ok(stats)
    }

    /// Listing prefix and reference set for a tenant's orphan report.
    ///
    /// With tenant-scoped keys the listing must stay under the tenant's root
    /// (an empty prefix means the whole root) and the tenant's references are
    /// subtracted. Unscoped keys cannot be attributed to a tenant, so the
    /// references of every tenant are subtracted instead.
    async fn orphan_scope(
        &self,
        tenant_id: &str,
        prefix: &str,
    ) -> Result<(String, ReferenceSet), AppError> {
        if !self.layout.tenant_scoped {
            let references = self.quota.referenced_keys_all_tenants().await?;
            return Ok((prefix.to_string(), references));
        }

        let root = self.layout.tenant_root(tenant_id);
        let prefix = if prefix.is_empty() {
            root.clone()
        } else {
            prefix.to_string()
        };
        if !prefix.starts_with(&root) {
            return Err(AppError::InvalidInput(format!(
                "Prefix '{}' is outside the tenant root '{}'",
                prefix, root
            )));
        }
        let references = self.quota.referenced_keys(tenant_id).await?;
        Ok((prefix, references))
    }

    /// One page of permanent objects under `prefix` that no content row
    /// references. Nothing is deleted.
    #[tracing::instrument(skip(self, cursor), fields(tenant.id = %tenant_id, cleanup.prefix = %prefix))]
    pub async fn orphan_report(
        &self,
        tenant_id: &str,
        prefix: &str,
        cursor: Option<OrphanCursor>,
    ) -> Result<OrphanReportPage, AppError> {
        let (prefix, references) = self.orphan_scope(tenant_id, prefix).await?;
        self.orphan_page(&references, &prefix, cursor).await
    }

    /// Every orphan under `prefix`, draining all pages. References are extracted
    /// once for the whole report.
    pub async fn orphan_report_all(
        &self,
        tenant_id: &str,
        prefix: &str,
    ) -> Result<OrphanReportPage, AppError> {
        let (prefix, references) = self.orphan_scope(tenant_id, prefix).await?;
        let mut combined = OrphanReportPage {
            orphans: Vec::new(),
            scanned: 0,
            unresolved_rows: references.unresolved_rows.len(),
            next_cursor: None,
        };

        let mut cursor = None;
        loop {
            let page = self.orphan_page(&references, &prefix, cursor).await?;
            combined.scanned += page.scanned;
            combined.orphans.extend(page.orphans);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            tenant.id = %tenant_id,
            scanned = combined.scanned,
            orphans = combined.orphans.len(),
            "Orphan report completed"
        );
        Ok(combined)
    }

    async fn orphan_page(
        &self,
        references: &ReferenceSet,
        prefix: &str,
        cursor: Option<OrphanCursor>,
    ) -> Result<OrphanReportPage, AppError> {
        let start_after = cursor.map(|c| c.start_after);
        let page = self
            .storage
            .list_page(prefix, start_after.as_deref(), self.page_size)
            .await
            .map_err(|e| AppError::storage(prefix.to_string(), e))?;

        let scanned = page.objects.len();
        let orphans = page
            .objects
            .into_iter()
            .filter(|o| is_permanent_key(&o.key) && !references.keys.contains(&o.key))
            .collect();

        Ok(OrphanReportPage {
            orphans,
            scanned,
            unresolved_rows: references.unresolved_rows.len(),
            next_cursor: page
                .next_start_after
                .map(|start_after| OrphanCursor { start_after }),
        })
    }
}

fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;
    use stowage_core::{ContentRow, ExtractionFailurePolicy};
    use stowage_db::InMemoryContentStore;
    use stowage_storage::{InMemoryStorage, StorageOp};

    fn sweeper(
        storage: Arc<InMemoryStorage>,
        content: Arc<InMemoryContentStore>,
    ) -> ReclaimSweeper {
        let quota = QuotaManager::new(
            content,
            storage.clone(),
            u64::MAX,
            ExtractionFailurePolicy::FailOpen,
        );
        ReclaimSweeper::new(
            storage,
            quota,
            KeyLayout::default(),
            Duration::from_secs(24 * 3600),
        )
        .with_batching(2, 2)
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_temp() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        storage
            .insert_at("image/temp/old.png", Bytes::from_static(b"o"), now - ChronoDuration::hours(25))
            .await;
        storage
            .insert_at("image/temp/new.png", Bytes::from_static(b"n"), now - ChronoDuration::hours(1))
            .await;
        storage
            .insert_at("image/2020/01/perm.png", Bytes::from_static(b"p"), now - ChronoDuration::days(900))
            .await;

        let report = sweeper(storage.clone(), InMemoryContentStore::new())
            .sweep_temp_at(now)
            .await;

        assert_eq!(report.deleted, 1);
        assert!(report.failures.is_empty());
        assert!(!storage.contains("image/temp/old.png").await);
        assert!(storage.contains("image/temp/new.png").await);
        assert!(storage.contains("image/2020/01/perm.png").await);
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        for i in 0..5 {
            storage
                .insert_at(
                    &format!("document/temp/{}.pdf", i),
                    Bytes::from_static(b"x"),
                    now - ChronoDuration::hours(48),
                )
                .await;
        }
        storage.fail_on(StorageOp::Delete, "document/temp/1.pdf").await;

        let report = sweeper(storage.clone(), InMemoryContentStore::new())
            .sweep_temp_at(now)
            .await;

        assert_eq!(report.deleted, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "document/temp/1.pdf");
        assert_eq!(storage.keys().await, vec!["document/temp/1.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_prefix_never_touches_permanent_keys() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        storage
            .insert_at("image/2020/01/perm.png", Bytes::from_static(b"p"), now - ChronoDuration::days(900))
            .await;
        storage
            .insert_at("image/temp/a.png", Bytes::from_static(b"a"), now - ChronoDuration::hours(2))
            .await;

        let report = sweeper(storage.clone(), InMemoryContentStore::new())
            .sweep_prefix_at("image/", Duration::from_secs(3600), now)
            .await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 1);
        assert!(storage.contains("image/2020/01/perm.png").await);
    }

    #[tokio::test]
    async fn test_temp_stats() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        let oldest = now - ChronoDuration::hours(30);
        storage.insert_at("image/temp/a.png", vec![0u8; 10], oldest).await;
        storage
            .insert_at("image/temp/b.png", vec![0u8; 5], now - ChronoDuration::hours(2))
            .await;

        let stats = sweeper(storage, InMemoryContentStore::new())
            .temp_stats_at(now)
            .await
            .unwrap();
        let image = stats.iter().find(|s| s.prefix == "image/temp/").unwrap();
        assert_eq!(image.count, 2);
        assert_eq!(image.total_bytes, 15);
        assert_eq!(image.expired, 1);
        assert_eq!(image.oldest, Some(oldest));
        assert_eq!(stats.iter().map(|s| s.count).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_orphan_report_is_set_difference() {
        let storage = Arc::new(InMemoryStorage::new());
        let content = InMemoryContentStore::new();
        let now = Utc::now();
        for key in ["image/2024/01/A.png", "image/2024/01/B.png", "image/2024/01/C.png"] {
            storage.insert_at(key, Bytes::from_static(b"x"), now).await;
        }
        storage
            .insert_at("image/temp/pending.png", Bytes::from_static(b"x"), now)
            .await;
        content
            .push(ContentRow {
                id: 1,
                tenant_id: "center-1".to_string(),
                thumbnail_url: Some(storage.url_for("image/2024/01/A.png")),
                body_markup: Some(format!(
                    r#"<img src="{}">"#,
                    storage.url_for("image/2024/01/B.png")
                )),
                ..Default::default()
            })
            .await;

        let sweeper = sweeper(storage.clone(), content);
        let report = sweeper.orphan_report_all("center-1", "").await.unwrap();
        let keys: Vec<_> = report.orphans.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["image/2024/01/C.png"]);
        assert_eq!(report.scanned, 4);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["orphans"][0]["key"], "image/2024/01/C.png");
        assert_eq!(json["orphans"][0]["size"], 1);

        // Report-only: everything is still there
        assert_eq!(storage.keys().await.len(), 4);
    }

    #[tokio::test]
    async fn test_orphan_report_keeps_other_tenants_objects() {
        let storage = Arc::new(InMemoryStorage::new());
        let content = InMemoryContentStore::new();
        let now = Utc::now();
        for key in ["image/2024/01/a.png", "image/2024/01/b.png", "image/2024/01/c.png"] {
            storage.insert_at(key, Bytes::from_static(b"x"), now).await;
        }
        for (id, tenant, key) in [(1, "center-1", "image/2024/01/a.png"), (2, "center-2", "image/2024/01/b.png")] {
            content
                .push(ContentRow {
                    id,
                    tenant_id: tenant.to_string(),
                    thumbnail_url: Some(storage.url_for(key)),
                    ..Default::default()
                })
                .await;
        }

        let report = sweeper(storage, content)
            .orphan_report_all("center-1", "image/")
            .await
            .unwrap();
        let keys: Vec<_> = report.orphans.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["image/2024/01/c.png"]);
    }

    #[tokio::test]
    async fn test_scoped_orphan_report_stays_under_tenant_root() {
        let storage = Arc::new(InMemoryStorage::new());
        let content = InMemoryContentStore::new();
        let now = Utc::now();
        let layout = KeyLayout::new(true);
        let own = format!("{}image/2024/01/a.png", layout.tenant_root("center-1"));
        let other = format!("{}image/2024/01/b.png", layout.tenant_root("center-2"));
        storage.insert_at(&own, Bytes::from_static(b"x"), now).await;
        storage.insert_at(&other, Bytes::from_static(b"x"), now).await;

        let quota = QuotaManager::new(
            content,
            storage.clone(),
            u64::MAX,
            ExtractionFailurePolicy::FailOpen,
        );
        let sweeper = ReclaimSweeper::new(storage, quota, layout, Duration::from_secs(3600));

        let report = sweeper.orphan_report_all("center-1", "").await.unwrap();
        let keys: Vec<_> = report.orphans.iter().map(|o| o.key.clone()).collect();
        assert_eq!(keys, vec![own]);

        assert!(matches!(
            sweeper.orphan_report("center-1", "tenants/center-2/", None).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_orphan_report_pages() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        for i in 0..5 {
            storage
                .insert_at(&format!("archive/2024/02/{}.zip", i), Bytes::from_static(b"z"), now)
                .await;
        }
        let sweeper = sweeper(storage, InMemoryContentStore::new());

        let first = sweeper.orphan_report("center-1", "archive/", None).await.unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.orphans.len(), 2);
        let cursor = first.next_cursor.clone().unwrap();
        assert_eq!(cursor.start_after, "archive/2024/02/1.zip");

        let mut pages = 1;
        let mut next = Some(cursor);
        let mut total = first.orphans.len();
        while let Some(cursor) = next {
            let page = sweeper
                .orphan_report("center-1", "archive/", Some(cursor))
                .await
                .unwrap();
            total += page.orphans.len();
            pages += 1;
            next = page.next_cursor;
        }
        assert_eq!(pages, 3);
        assert_eq!(total, 5);
    }
}
