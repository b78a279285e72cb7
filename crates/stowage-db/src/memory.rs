//! In-memory stores for tests and local development without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use stowage_core::{AppError, Attachment, ContentRow, NewAttachment, UploadUsage};
use tokio::sync::RwLock;

use crate::db::{AttachmentStore, ContentStore};

#[derive(Default)]
pub struct InMemoryAttachmentStore {
    rows: RwLock<BTreeMap<i64, Attachment>>,
    post_authors: RwLock<HashMap<i64, String>>,
    next_id: AtomicI64,
    fail_usage: AtomicBool,
    fail_inserts: AtomicBool,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set_post_author(&self, post_id: i64, author: &str) {
        self.post_authors
            .write()
            .await
            .insert(post_id, author.to_string());
    }

    /// Insert a row with an explicit creation time.
    pub async fn insert_at(&self, attachment: NewAttachment, created_at: DateTime<Utc>) -> Attachment {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Attachment {
            id,
            post_id: attachment.post_id,
            tenant_id: attachment.tenant_id,
            user_id: attachment.user_id,
            original_name: attachment.original_name,
            stored_key: attachment.stored_key,
            size: attachment.size,
            mime_type: attachment.mime_type,
            url: attachment.url,
            download_count: 0,
            created_at,
        };
        self.rows.write().await.insert(id, row.clone());
        row
    }

    /// Make `rolling_usage` fail, as a broken database would.
    pub fn fail_usage_lookups(&self, fail: bool) {
        self.fail_usage.store(fail, Ordering::SeqCst);
    }

    /// Make `insert` fail, as a constraint violation would.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Attachment> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn rolling_usage(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<UploadUsage, AppError> {
        if self.fail_usage.load(Ordering::SeqCst) {
            return Err(AppError::Internal("usage lookup unavailable".to_string()));
        }
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|a| a.user_id == user_id && a.created_at >= since)
            .fold(UploadUsage::default(), |acc, a| UploadUsage {
                count: acc.count + 1,
                total_bytes: acc.total_bytes + a.size.max(0) as u64,
            }))
    }

    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Internal(format!(
                "insert into attachments violates foreign key on post {}",
                attachment.post_id
            )));
        }
        Ok(self.insert_at(attachment, Utc::now()).await)
    }

    async fn get(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Attachment>, AppError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|a| a.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn increment_download_count(&self, id: i64) -> Result<bool, AppError> {
        match self.rows.write().await.get_mut(&id) {
            Some(row) => {
                row.download_count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn post_author(&self, post_id: i64) -> Result<Option<String>, AppError> {
        Ok(self.post_authors.read().await.get(&post_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryContentStore {
    rows: RwLock<Vec<ContentRow>>,
}

impl InMemoryContentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, row: ContentRow) {
        self.rows.write().await.push(row);
    }

    /// Replace the row with the same id, or append it.
    pub async fn upsert(&self, row: ContentRow) {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id == row.id && r.tenant_id == row.tenant_id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn list_tenant_content(&self, tenant_id: &str) -> Result<Vec<ContentRow>, AppError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_tenant_ids(&self) -> Result<Vec<String>, AppError> {
        let tenants: BTreeSet<String> = self
            .rows
            .read()
            .await
            .iter()
            .map(|r| r.tenant_id.clone())
            .collect();
        Ok(tenants.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attachment(user: &str, size: i64) -> NewAttachment {
        NewAttachment {
            post_id: 1,
            tenant_id: "t".to_string(),
            user_id: user.to_string(),
            original_name: "a.png".to_string(),
            stored_key: format!("image/2024/01/{user}-{size}.png"),
            size,
            mime_type: "image/png".to_string(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_rolling_usage_window() {
        let store = InMemoryAttachmentStore::new();
        let now = Utc::now();
        store.insert_at(attachment("u1", 100), now - Duration::hours(1)).await;
        store.insert_at(attachment("u1", 50), now - Duration::hours(30)).await;
        store.insert_at(attachment("u2", 70), now).await;

        let usage = store
            .rolling_usage("u1", now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(usage, UploadUsage { count: 1, total_bytes: 100 });
    }

    #[tokio::test]
    async fn test_download_count_and_delete() {
        let store = InMemoryAttachmentStore::new();
        let row = store.insert(attachment("u1", 1)).await.unwrap();
        assert!(store.increment_download_count(row.id).await.unwrap());
        assert_eq!(store.get(row.id).await.unwrap().unwrap().download_count, 1);
        assert!(store.delete(row.id).await.unwrap());
        assert!(!store.increment_download_count(row.id).await.unwrap());
    }
}
