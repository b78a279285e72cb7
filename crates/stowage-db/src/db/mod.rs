//! Repository traits and their Postgres implementations.

pub mod attachment;
pub mod content;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stowage_core::{AppError, Attachment, ContentRow, NewAttachment, UploadUsage};

pub use attachment::AttachmentRepository;
pub use content::ContentRepository;

/// Attachment rows keyed by post.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Number and total size of attachments a user created since `since`.
    async fn rolling_usage(&self, user_id: &str, since: DateTime<Utc>)
        -> Result<UploadUsage, AppError>;

    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, AppError>;

    async fn get(&self, id: i64) -> Result<Option<Attachment>, AppError>;

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Attachment>, AppError>;

    /// Returns false when the row does not exist.
    async fn increment_download_count(&self, id: i64) -> Result<bool, AppError>;

    /// Returns false when the row does not exist.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;

    /// Author of a post, if the post exists.
    async fn post_author(&self, post_id: i64) -> Result<Option<String>, AppError>;
}

/// Content rows that may embed object references.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn list_tenant_content(&self, tenant_id: &str) -> Result<Vec<ContentRow>, AppError>;

    /// Every tenant that owns at least one content row.
    async fn list_tenant_ids(&self) -> Result<Vec<String>, AppError>;
}
