//! Temp -> permanent object lifecycle.
//!
//! Every accepted upload lands under a temp key. When the owning post is
//! finalized each temp object is promoted: copied to a date-partitioned
//! permanent key, then the temp object is deleted. Copy and delete are two
//! backend calls and are not atomic.

mod rewrite;

pub use rewrite::{FailedPromotion, RewriteOutcome};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use stowage_core::{AppError, Category, LifecycleState, StorageObject};
use stowage_storage::{KeyLayout, PutOptions, Storage, StorageError, TempKey};

/// An object written under a temp key.
#[derive(Debug, Clone, Serialize)]
pub struct StagedObject {
    #[serde(flatten)]
    pub object: StorageObject,
    pub url: String,
}

/// A completed promotion.
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub temp_key: String,
    pub permanent_key: String,
    pub url: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// The copy succeeded but the temp object could not be deleted. Both copies
    /// stay live until the temp sweep removes the old one.
    pub temp_retained: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("'{0}' is not a temp key")]
    InvalidTempKey(String),

    /// The temp object does not exist, typically because it was already
    /// promoted or swept.
    #[error("Temp object '{0}' does not exist")]
    SourceMissing(String),

    #[error("Promotion of '{key}' failed: {source}")]
    Backend {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl From<PromotionError> for AppError {
    fn from(err: PromotionError) -> Self {
        match err {
            PromotionError::InvalidTempKey(key) => {
                AppError::InvalidInput(format!("'{}' is not a temp upload", key))
            }
            PromotionError::SourceMissing(key) => {
                AppError::NotFound(format!("Temp upload '{}'", key))
            }
            PromotionError::Backend { key, source } => AppError::storage(key, source),
        }
    }
}

/// Owner of the temp -> permanent state machine.
#[derive(Clone)]
pub struct StagingStore {
    storage: Arc<dyn Storage>,
    layout: KeyLayout,
}

impl StagingStore {
    pub fn new(storage: Arc<dyn Storage>, layout: KeyLayout) -> Self {
        Self { storage, layout }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Write an accepted upload under a fresh temp key. There is no direct path
    /// to a permanent key.
    #[tracing::instrument(skip(self, data), fields(tenant.id = %tenant_id, category = %category, size_bytes = data.len()))]
    pub async fn create(
        &self,
        tenant_id: &str,
        category: Category,
        original_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<StagedObject, AppError> {
        let key = self.layout.temp_key(tenant_id, category, original_name);
        let size = data.len() as u64;
        let options = PutOptions::new(content_type).with_download_name(original_name);

        let url = self
            .storage
            .put(&key, data, options)
            .await
            .map_err(|e| AppError::storage(key.clone(), e))?;

        tracing::info!(key = %key, "Upload staged");

        Ok(StagedObject {
            object: StorageObject {
                key,
                tenant_id: tenant_id.to_string(),
                category,
                size,
                content_type: content_type.to_string(),
                lifecycle_state: LifecycleState::Temp,
                last_modified: Utc::now(),
            },
            url,
        })
    }

    pub async fn promote(&self, temp_key: &str) -> Result<Promotion, PromotionError> {
        self.promote_at(temp_key, Utc::now()).await
    }

    /// Promote a temp object to a permanent key dated `now`.
    ///
    /// The source is checked before copying, so promoting the same key a second
    /// time fails with `SourceMissing`. A failed copy leaves the temp object in
    /// place. A failed delete after a successful copy is reported through
    /// `temp_retained` and is not an error.
    #[tracing::instrument(skip(self, now), fields(temp_key = %temp_key))]
    pub async fn promote_at(
        &self,
        temp_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Promotion, PromotionError> {
        let parsed = TempKey::parse(temp_key)
            .ok_or_else(|| PromotionError::InvalidTempKey(temp_key.to_string()))?;

        let info = self
            .storage
            .head(temp_key)
            .await
            .map_err(|e| Self::source_error(temp_key, e))?;

        let permanent_key = parsed.permanent_key(now);
        let url = self
            .storage
            .copy(temp_key, &permanent_key)
            .await
            .map_err(|e| Self::source_error(temp_key, e))?;

        let temp_retained = match self.storage.delete(temp_key).await {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    temp_key = %temp_key,
                    permanent_key = %permanent_key,
                    "Promoted object but failed to delete temp copy"
                );
                true
            }
        };

        tracing::info!(permanent_key = %permanent_key, "Object promoted");

        Ok(Promotion {
            temp_key: temp_key.to_string(),
            permanent_key,
            url,
            size: info.size,
            content_type: info.content_type,
            temp_retained,
        })
    }

    fn source_error(key: &str, err: StorageError) -> PromotionError {
        if err.is_not_found() {
            PromotionError::SourceMissing(key.to_string())
        } else {
            PromotionError::Backend {
                key: key.to_string(),
                source: err,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stowage_storage::keys::{is_permanent_key, is_temp_key};
    use stowage_storage::{InMemoryStorage, StorageOp};

    fn staging() -> (Arc<InMemoryStorage>, StagingStore) {
        let storage = Arc::new(InMemoryStorage::new());
        let store = StagingStore::new(storage.clone(), KeyLayout::default());
        (storage, store)
    }

    #[tokio::test]
    async fn test_create_lands_in_temp() {
        let (storage, store) = staging();
        let staged = store
            .create("center-1", Category::Image, "cat.PNG", "image/png", Bytes::from_static(b"png"))
            .await
            .unwrap();

        assert!(staged.object.key.starts_with("image/temp/"));
        assert!(staged.object.key.ends_with(".png"));
        assert!(is_temp_key(&staged.object.key));
        assert!(!is_permanent_key(&staged.object.key));
        assert_eq!(staged.object.lifecycle_state, LifecycleState::Temp);
        assert_eq!(staged.object.size, 3);
        assert_eq!(staged.url, storage.url_for(&staged.object.key));
        assert_eq!(
            storage.content_type_of(&staged.object.key).await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_tenant_scoped_layout() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = StagingStore::new(storage, KeyLayout::new(true));
        let staged = store
            .create("center-1", Category::Document, "a.pdf", "application/pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();
        assert!(staged.object.key.starts_with("tenants/center-1/document/temp/"));

        let promotion = store.promote(&staged.object.key).await.unwrap();
        assert!(promotion.permanent_key.starts_with("tenants/center-1/document/"));
    }

    #[tokio::test]
    async fn test_promote_moves_object() {
        let (storage, store) = staging();
        let staged = store
            .create("center-1", Category::Image, "a.jpg", "image/jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let promotion = store.promote_at(&staged.object.key, now).await.unwrap();

        assert!(promotion.permanent_key.starts_with("image/2024/03/"));
        assert!(promotion.permanent_key.ends_with(".jpg"));
        assert!(is_permanent_key(&promotion.permanent_key));
        assert!(!promotion.temp_retained);
        assert_eq!(promotion.size, 4);
        assert!(!storage.contains(&staged.object.key).await);
        assert!(storage.contains(&promotion.permanent_key).await);
    }

    #[tokio::test]
    async fn test_second_promotion_fails_cleanly() {
        let (storage, store) = staging();
        let staged = store
            .create("center-1", Category::Image, "a.jpg", "image/jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        store.promote(&staged.object.key).await.unwrap();
        let err = store.promote(&staged.object.key).await.unwrap_err();
        assert!(matches!(err, PromotionError::SourceMissing(_)));
        assert_eq!(storage.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_temp() {
        let (storage, store) = staging();
        let staged = store
            .create("center-1", Category::Image, "a.jpg", "image/jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        storage.fail_on(StorageOp::Copy, &staged.object.key).await;

        let err = store.promote(&staged.object.key).await.unwrap_err();
        assert!(matches!(err, PromotionError::Backend { .. }));
        assert!(storage.contains(&staged.object.key).await);
        assert_eq!(storage.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_retains_temp() {
        let (storage, store) = staging();
        let staged = store
            .create("center-1", Category::Image, "a.jpg", "image/jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        storage.fail_on(StorageOp::Delete, &staged.object.key).await;

        let promotion = store.promote(&staged.object.key).await.unwrap();
        assert!(promotion.temp_retained);
        assert!(storage.contains(&staged.object.key).await);
        assert!(storage.contains(&promotion.permanent_key).await);
    }

    #[tokio::test]
    async fn test_rejects_non_temp_keys() {
        let (_, store) = staging();
        for key in ["image/2024/01/a.png", "../image/temp/a.png", "other/temp/a.png"] {
            assert!(matches!(
                store.promote(key).await,
                Err(PromotionError::InvalidTempKey(_))
            ));
        }
    }
}
