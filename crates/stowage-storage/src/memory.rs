//! In-process storage backend.
//!
//! Keeps objects in a sorted map so listings come back in key order like S3.
//! Failures can be injected per operation and key, and `last_modified` can be
//! backdated, which is what sweep and promotion tests need.

use crate::disposition::content_disposition;
use crate::traits::{ListPage, ObjectInfo, PutOptions, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Put,
    Get,
    Head,
    /// Matches on the source key.
    Copy,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    download_name: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InMemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    failures: Arc<RwLock<HashSet<(StorageOp, String)>>>,
    base_url: String,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_base_url("memory://stowage")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            failures: Arc::new(RwLock::new(HashSet::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Insert an object with an explicit modification time.
    pub async fn insert_at(&self, key: &str, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: None,
                download_name: None,
                last_modified,
            },
        );
    }

    /// Make every future `op` on `key` fail with a backend error.
    pub async fn fail_on(&self, op: StorageOp, key: &str) {
        self.failures.write().await.insert((op, key.to_string()));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    async fn check_failure(&self, op: StorageOp, key: &str) -> StorageResult<()> {
        if self.failures.read().await.contains(&(op, key.to_string())) {
            return Err(StorageError::BackendError(format!(
                "injected {:?} failure for {}",
                op, key
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, key: &str, data: Bytes, options: PutOptions) -> StorageResult<String> {
        self.check_failure(StorageOp::Put, key).await?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: options.content_type,
                download_name: options.download_name,
                last_modified: Utc::now(),
            },
        );
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.check_failure(StorageOp::Get, key).await?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        self.check_failure(StorageOp::Head, key).await?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| ObjectInfo {
                key: key.to_string(),
                size: o.data.len() as u64,
                last_modified: o.last_modified,
                content_type: o.content_type.clone(),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String> {
        self.check_failure(StorageOp::Copy, from_key).await?;
        let mut objects = self.objects.write().await;
        let source = objects
            .get(from_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        objects.insert(
            to_key.to_string(),
            StoredObject {
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(self.url_for(to_key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_failure(StorageOp::Delete, key).await?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage> {
        let lower = match start_after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let objects = self.objects.read().await;
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .skip_while(|(key, _)| !key.starts_with(prefix) && key.as_str() < prefix)
            .take_while(|(key, _)| key.starts_with(prefix));

        let page: Vec<ObjectInfo> = matching
            .by_ref()
            .take(max_keys)
            .map(|(key, o)| ObjectInfo {
                key: key.clone(),
                size: o.data.len() as u64,
                last_modified: o.last_modified,
                content_type: o.content_type.clone(),
            })
            .collect();
        let has_more = matching.next().is_some();

        Ok(ListPage {
            next_start_after: if has_more {
                page.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects: page,
        })
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> StorageResult<String> {
        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let mut url = format!("{}?expires={}", self.url_for(key), expires_in.as_secs());
        if let Some(name) = download_name.or(object.download_name.as_deref()) {
            url.push_str("&response-content-disposition=");
            url.push_str(&urlencoding::encode(&content_disposition(name)));
        }
        Ok(url)
    }

    fn public_base_url(&self) -> String {
        self.base_url.clone()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_then_delete_leaves_only_destination() {
        let storage = InMemoryStorage::new();
        storage
            .put("image/temp/a.png", Bytes::from_static(b"png"), PutOptions::new("image/png"))
            .await
            .unwrap();
        storage.copy("image/temp/a.png", "image/2024/05/b.png").await.unwrap();
        storage.delete("image/temp/a.png").await.unwrap();

        assert!(!storage.contains("image/temp/a.png").await);
        assert_eq!(
            storage.content_type_of("image/2024/05/b.png").await.as_deref(),
            Some("image/png")
        );
        let second = storage.copy("image/temp/a.png", "image/2024/05/c.png").await;
        assert!(matches!(second, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let storage = InMemoryStorage::new();
        storage.fail_on(StorageOp::Delete, "k").await;
        assert!(matches!(
            storage.delete("k").await,
            Err(StorageError::BackendError(_))
        ));
        storage.clear_failures().await;
        assert!(storage.delete("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_page_respects_prefix_and_cursor() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        for key in ["a/1", "b/temp/1", "b/temp/2", "b/temp/3", "c/1"] {
            storage.insert_at(key, Bytes::from_static(b"x"), now).await;
        }

        let first = storage.list_page("b/temp/", None, 2).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_start_after.as_deref(), Some("b/temp/2"));

        let second = storage
            .list_page("b/temp/", first.next_start_after.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "b/temp/3");
        assert!(second.next_start_after.is_none());
    }

    #[tokio::test]
    async fn test_key_from_url() {
        let storage = InMemoryStorage::with_base_url("https://cdn.example.com/");
        assert_eq!(
            storage.key_from_url("https://cdn.example.com/image/temp/a.png?v=1").as_deref(),
            Some("image/temp/a.png")
        );
        assert_eq!(storage.key_from_url("https://elsewhere.com/a.png"), None);
    }
}
