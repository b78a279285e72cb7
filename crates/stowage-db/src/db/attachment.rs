use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use stowage_core::{AppError, Attachment, NewAttachment, UploadUsage};

use super::AttachmentStore;

/// Repository for post attachments
#[derive(Clone)]
pub struct AttachmentRepository {
    pool: PgPool,
}

impl AttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ATTACHMENT_COLUMNS: &str = "id, post_id, tenant_id, user_id, original_name, stored_key, \
     size, mime_type, url, download_count, created_at";

#[async_trait]
impl AttachmentStore for AttachmentRepository {
    #[tracing::instrument(skip(self), fields(db.table = "attachments"))]
    async fn rolling_usage(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<UploadUsage, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS file_count, COALESCE(SUM(size), 0)::BIGINT AS total_size
            FROM attachments
            WHERE user_id = $1 AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("file_count")?;
        let total: i64 = row.try_get("total_size")?;

        Ok(UploadUsage {
            count: count.max(0) as u64,
            total_bytes: total.max(0) as u64,
        })
    }

    #[tracing::instrument(skip(self, attachment), fields(db.table = "attachments", post_id = attachment.post_id))]
    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, AppError> {
        let row = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO attachments (
                post_id, tenant_id, user_id, original_name, stored_key, size, mime_type, url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(attachment.post_id)
        .bind(attachment.tenant_id)
        .bind(attachment.user_id)
        .bind(attachment.original_name)
        .bind(attachment.stored_key)
        .bind(attachment.size)
        .bind(attachment.mime_type)
        .bind(attachment.url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments"))]
    async fn get(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        let row = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE id = $1",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments"))]
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Attachment>, AppError> {
        let rows = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
            ATTACHMENT_COLUMNS
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments"))]
    async fn increment_download_count(&self, id: i64) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE attachments SET download_count = download_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments"))]
    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "posts"))]
    async fn post_author(&self, post_id: i64) -> Result<Option<String>, AppError> {
        let author: Option<String> =
            sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(author)
    }
}
