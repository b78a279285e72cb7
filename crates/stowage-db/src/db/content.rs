use async_trait::async_trait;
use sqlx::PgPool;
use stowage_core::{AppError, ContentRow};

use super::ContentStore;

/// Repository for tenant content scanned by quota and orphan checks
#[derive(Clone)]
pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for ContentRepository {
    /// Posts of the tenant, followed by one row per attachment whose URL is
    /// exposed as the thumbnail field so it is counted like any other reference.
    #[tracing::instrument(skip(self), fields(db.table = "posts"))]
    async fn list_tenant_content(&self, tenant_id: &str) -> Result<Vec<ContentRow>, AppError> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, tenant_id, thumbnail_url, body_markup, body_tree
            FROM posts
            WHERE tenant_id = $1
            UNION ALL
            SELECT id, tenant_id, url AS thumbnail_url, NULL AS body_markup, NULL AS body_tree
            FROM attachments
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(tenant_id = %tenant_id, rows = rows.len(), "Loaded tenant content rows");

        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "posts"))]
    async fn list_tenant_ids(&self) -> Result<Vec<String>, AppError> {
        let tenants: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT tenant_id FROM posts
            UNION
            SELECT tenant_id FROM attachments
            ORDER BY tenant_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tenants)
    }
}
