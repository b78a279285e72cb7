use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stowage_core::{AppError, ExtractionFailurePolicy};
use tokio::sync::Mutex;

use super::{QuotaProvider, QuotaStats};

const DEFAULT_CAPACITY: usize = 1024;

/// TTL-bounded cache in front of another [`QuotaProvider`].
///
/// A cached entry can lag behind the backend by up to `ttl`. Callers that write
/// objects must call [`invalidate`](QuotaProvider::invalidate) for the tenant.
pub struct CachedQuotaManager {
    inner: Arc<dyn QuotaProvider>,
    ttl: Duration,
    cache: Mutex<LruCache<String, (Instant, QuotaStats)>>,
}

impl CachedQuotaManager {
    pub fn new(inner: Arc<dyn QuotaProvider>, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: Arc<dyn QuotaProvider>, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl QuotaProvider for CachedQuotaManager {
    async fn stats(&self, tenant_id: &str) -> Result<QuotaStats, AppError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some((computed_at, stats)) = cache.get(tenant_id) {
                if computed_at.elapsed() < self.ttl {
                    tracing::debug!(tenant.id = %tenant_id, "Quota cache hit");
                    return Ok(stats.clone());
                }
            }
        }

        let stats = self.inner.stats(tenant_id).await?;
        self.cache
            .lock()
            .await
            .put(tenant_id.to_string(), (Instant::now(), stats.clone()));
        Ok(stats)
    }

    fn extraction_policy(&self) -> ExtractionFailurePolicy {
        self.inner.extraction_policy()
    }

    async fn invalidate(&self, tenant_id: &str) {
        self.cache.lock().await.pop(tenant_id);
        self.inner.invalidate(tenant_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaManager;
    use bytes::Bytes;
    use stowage_core::ContentRow;
    use stowage_db::InMemoryContentStore;
    use stowage_storage::{InMemoryStorage, PutOptions, Storage};

    async fn setup(ttl: Duration) -> (Arc<InMemoryStorage>, CachedQuotaManager) {
        let storage = Arc::new(InMemoryStorage::new());
        let content = InMemoryContentStore::new();
        let url = storage
            .put("image/2024/01/a.png", Bytes::from(vec![0u8; 10]), PutOptions::default())
            .await
            .unwrap();
        content
            .push(ContentRow {
                id: 1,
                tenant_id: "center-1".to_string(),
                thumbnail_url: Some(url),
                ..Default::default()
            })
            .await;

        let inner = QuotaManager::new(
            content,
            storage.clone(),
            100,
            ExtractionFailurePolicy::FailOpen,
        );
        (storage, CachedQuotaManager::new(Arc::new(inner), ttl))
    }

    #[tokio::test]
    async fn test_serves_cached_value_until_invalidated() {
        let (storage, cached) = setup(Duration::from_secs(300)).await;
        assert_eq!(cached.usage("center-1").await.unwrap().used_bytes, 10);

        storage
            .put("image/2024/01/a.png", Bytes::from(vec![0u8; 30]), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(cached.usage("center-1").await.unwrap().used_bytes, 10);

        cached.invalidate("center-1").await;
        assert_eq!(cached.usage("center-1").await.unwrap().used_bytes, 30);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_recomputes() {
        let (storage, cached) = setup(Duration::ZERO).await;
        assert_eq!(cached.usage("center-1").await.unwrap().used_bytes, 10);
        storage
            .put("image/2024/01/a.png", Bytes::from(vec![0u8; 30]), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(cached.usage("center-1").await.unwrap().used_bytes, 30);
    }

    #[tokio::test]
    async fn test_check_quota_uses_cached_stats() {
        let (_, cached) = setup(Duration::from_secs(300)).await;
        assert!(cached.check_quota("center-1", 90).await.is_ok());
        assert!(matches!(
            cached.check_quota("center-1", 91).await,
            Err(AppError::QuotaExceeded { .. })
        ));
    }
}
