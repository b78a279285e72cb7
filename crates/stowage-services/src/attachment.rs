//! Attachment lifecycle around a post: finalize, download, delete.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stowage_core::policy::{MAX_FILES_PER_POST, MAX_TOTAL_SIZE_PER_POST};
use stowage_core::{format_bytes, AppError, Attachment, NewAttachment, UploadContext};
use stowage_db::AttachmentStore;
use stowage_storage::TempKey;

use crate::quota::QuotaProvider;
use crate::staging::{Promotion, StagingStore};
use crate::upload::sanitize_filename;

/// A staged upload the client wants attached to a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAttachment {
    pub temp_key: String,
    pub original_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeFailure {
    pub temp_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalizeOutcome {
    pub processed: Vec<Attachment>,
    pub failed: Vec<FinalizeFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub file_name: String,
    pub expires_in_secs: u64,
}

#[derive(Clone)]
pub struct AttachmentService {
    attachments: Arc<dyn AttachmentStore>,
    staging: StagingStore,
    quota: Arc<dyn QuotaProvider>,
    download_ttl: Duration,
}

impl AttachmentService {
    pub fn new(
        attachments: Arc<dyn AttachmentStore>,
        staging: StagingStore,
        quota: Arc<dyn QuotaProvider>,
        download_ttl: Duration,
    ) -> Self {
        Self {
            attachments,
            staging,
            quota,
            download_ttl,
        }
    }

    /// The post must exist. Moderators may manage any post, everyone else only
    /// their own.
    async fn ensure_can_manage(&self, post_id: i64, ctx: &UploadContext) -> Result<(), AppError> {
        let author = self
            .attachments
            .post_author(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {}", post_id)))?;

        if ctx.role.is_moderator() || ctx.user_id.as_deref() == Some(author.as_str()) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Not allowed to manage attachments of post {}",
                post_id
            )))
        }
    }

    /// Temp keys under another tenant's root. Unscoped layouts have an empty
    /// root for everyone.
    fn is_foreign_upload(&self, tenant_id: &str, temp_key: &str) -> bool {
        let root = self.staging.layout().tenant_root(tenant_id);
        TempKey::parse(temp_key).is_some_and(|parsed| parsed.root != root)
    }

    /// Undo a promotion whose row could not be written: restore the temp
    /// object, then drop the permanent copy.
    async fn rollback_promotion(&self, promotion: &Promotion) {
        let storage = self.staging.storage();
        if !promotion.temp_retained {
            if let Err(e) = storage.copy(&promotion.permanent_key, &promotion.temp_key).await {
                tracing::error!(
                    error = %e,
                    permanent_key = %promotion.permanent_key,
                    "Could not restore temp object; keeping the permanent copy"
                );
                return;
            }
        }
        if let Err(e) = storage.delete(&promotion.permanent_key).await {
            tracing::error!(
                error = %e,
                permanent_key = %promotion.permanent_key,
                "Failed to remove unrecorded permanent object"
            );
        }
    }

    /// Promote staged uploads and record them as attachments of `post_id`.
    ///
    /// The post must exist and post limits are checked up front; either failure
    /// rejects the whole request before anything moves. After that each upload
    /// is handled on its own: a failed promotion or insert is reported and the
    /// others continue. A failed insert puts the object back under its temp key.
    #[tracing::instrument(skip(self, ctx, uploads), fields(post.id = post_id, upload_count = uploads.len()))]
    pub async fn finalize(
        &self,
        post_id: i64,
        ctx: &UploadContext,
        uploads: Vec<PendingAttachment>,
    ) -> Result<FinalizeOutcome, AppError> {
        let user_id = ctx
            .user_id
            .clone()
            .ok_or_else(|| AppError::Forbidden("A signed-in user is required".to_string()))?;
        self.ensure_can_manage(post_id, ctx).await?;

        let existing = self.attachments.list_for_post(post_id).await?;
        if existing.len() + uploads.len() > MAX_FILES_PER_POST {
            return Err(AppError::InvalidInput(format!(
                "A post can have at most {} attachments",
                MAX_FILES_PER_POST
            )));
        }

        let mut total: u64 = existing.iter().map(|a| a.size.max(0) as u64).sum();
        for upload in &uploads {
            if let Ok(info) = self.staging.storage().head(&upload.temp_key).await {
                total = total.saturating_add(info.size);
            }
        }
        if total > MAX_TOTAL_SIZE_PER_POST {
            return Err(AppError::PayloadTooLarge(format!(
                "Attachments total {} but a post allows {}",
                format_bytes(total),
                format_bytes(MAX_TOTAL_SIZE_PER_POST)
            )));
        }

        let mut outcome = FinalizeOutcome::default();
        for upload in uploads {
            if self.is_foreign_upload(&ctx.tenant_id, &upload.temp_key) {
                tracing::warn!(temp_key = %upload.temp_key, "Refusing another tenant's upload");
                outcome.failed.push(FinalizeFailure {
                    error: format!("'{}' is not an upload of this tenant", upload.temp_key),
                    temp_key: upload.temp_key,
                });
                continue;
            }

            let promotion = match self.staging.promote(&upload.temp_key).await {
                Ok(promotion) => promotion,
                Err(e) => {
                    tracing::warn!(error = %e, temp_key = %upload.temp_key, "Attachment promotion failed");
                    outcome.failed.push(FinalizeFailure {
                        temp_key: upload.temp_key,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let row = NewAttachment {
                post_id,
                tenant_id: ctx.tenant_id.clone(),
                user_id: user_id.clone(),
                original_name: upload.original_name,
                stored_key: promotion.permanent_key.clone(),
                size: promotion.size as i64,
                mime_type: promotion.content_type.clone().unwrap_or(upload.mime_type),
                url: promotion.url.clone(),
            };
            match self.attachments.insert(row).await {
                Ok(attachment) => outcome.processed.push(attachment),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        permanent_key = %promotion.permanent_key,
                        "Promoted attachment could not be recorded"
                    );
                    self.rollback_promotion(&promotion).await;
                    outcome.failed.push(FinalizeFailure {
                        temp_key: upload.temp_key,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !outcome.processed.is_empty() {
            self.quota.invalidate(&ctx.tenant_id).await;
        }
        tracing::info!(
            processed = outcome.processed.len(),
            failed = outcome.failed.len(),
            "Attachments finalized"
        );
        Ok(outcome)
    }

    /// Issue a signed download URL and count the download.
    #[tracing::instrument(skip(self, ttl), fields(attachment.id = attachment_id))]
    pub async fn download_url(
        &self,
        attachment_id: i64,
        ttl: Option<Duration>,
    ) -> Result<DownloadLink, AppError> {
        let attachment = self
            .attachments
            .get(attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attachment {}", attachment_id)))?;

        let ttl = ttl.unwrap_or(self.download_ttl);
        let file_name = sanitize_filename(&attachment.original_name);
        let url = self
            .staging
            .storage()
            .presigned_get_url(&attachment.stored_key, ttl, Some(&file_name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AppError::NotFound(format!("Stored object for attachment {}", attachment_id))
                } else {
                    AppError::storage(attachment.stored_key.clone(), e)
                }
            })?;

        self.attachments
            .increment_download_count(attachment_id)
            .await?;

        Ok(DownloadLink {
            url,
            file_name,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Delete an attachment: the object first, then its row. Allowed for
    /// moderators and the post author.
    #[tracing::instrument(skip(self, ctx), fields(attachment.id = attachment_id))]
    pub async fn delete(&self, attachment_id: i64, ctx: &UploadContext) -> Result<(), AppError> {
        let attachment = self
            .attachments
            .get(attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attachment {}", attachment_id)))?;

        if !ctx.role.is_moderator() {
            let author = self.attachments.post_author(attachment.post_id).await?;
            let is_author = matches!(
                (author.as_deref(), ctx.user_id.as_deref()),
                (Some(author), Some(user)) if author == user
            );
            if !is_author {
                return Err(AppError::Forbidden(format!(
                    "Not allowed to delete attachment {}",
                    attachment_id
                )));
            }
        }

        self.staging
            .storage()
            .delete(&attachment.stored_key)
            .await
            .map_err(|e| AppError::storage(attachment.stored_key.clone(), e))?;
        self.attachments.delete(attachment_id).await?;
        self.quota.invalidate(&attachment.tenant_id).await;

        tracing::info!(stored_key = %attachment.stored_key, "Attachment deleted");
        Ok(())
    }

    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<Attachment>, AppError> {
        self.attachments.list_for_post(post_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaManager;
    use bytes::Bytes;
    use stowage_core::{Category, ExtractionFailurePolicy, Role};
    use stowage_db::{InMemoryAttachmentStore, InMemoryContentStore};
    use stowage_storage::keys::is_permanent_key;
    use stowage_storage::{InMemoryStorage, KeyLayout, Storage, StorageOp};

    struct Fixture {
        storage: Arc<InMemoryStorage>,
        attachments: Arc<InMemoryAttachmentStore>,
        staging: StagingStore,
        service: AttachmentService,
    }

    fn fixture() -> Fixture {
        fixture_with(KeyLayout::default())
    }

    fn fixture_with(layout: KeyLayout) -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let attachments = InMemoryAttachmentStore::new();
        let staging = StagingStore::new(storage.clone(), layout);
        let quota = QuotaManager::new(
            InMemoryContentStore::new(),
            storage.clone(),
            u64::MAX,
            ExtractionFailurePolicy::FailOpen,
        );
        let service = AttachmentService::new(
            attachments.clone(),
            staging.clone(),
            Arc::new(quota),
            Duration::from_secs(900),
        );
        Fixture {
            storage,
            attachments,
            staging,
            service,
        }
    }

    async fn stage(f: &Fixture, name: &str) -> PendingAttachment {
        stage_for(f, "center-1", name).await
    }

    async fn stage_for(f: &Fixture, tenant_id: &str, name: &str) -> PendingAttachment {
        let staged = f
            .staging
            .create(tenant_id, Category::Document, name, "application/pdf", Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();
        PendingAttachment {
            temp_key: staged.object.key,
            original_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
        }
    }

    fn teacher() -> UploadContext {
        UploadContext::new("t1", Role::Teacher, "center-1")
    }

    #[tokio::test]
    async fn test_finalize_promotes_and_records() {
        let f = fixture();
        f.attachments.set_post_author(5, "t1").await;
        let a = stage(&f, "syllabus.pdf").await;
        let b = stage(&f, "homework.pdf").await;
        f.storage.fail_on(StorageOp::Copy, &b.temp_key).await;

        let outcome = f.service.finalize(5, &teacher(), vec![a, b.clone()]).await.unwrap();

        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].temp_key, b.temp_key);
        let attachment = &outcome.processed[0];
        assert!(is_permanent_key(&attachment.stored_key));
        assert_eq!(attachment.size, 8);
        assert_eq!(attachment.original_name, "syllabus.pdf");
        assert_eq!(f.service.list_for_post(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_enforces_file_count() {
        let f = fixture();
        f.attachments.set_post_author(1, "t1").await;
        let mut uploads = Vec::new();
        for i in 0..=MAX_FILES_PER_POST {
            uploads.push(stage(&f, &format!("f{}.pdf", i)).await);
        }
        assert!(matches!(
            f.service.finalize(1, &teacher(), uploads).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_rejects_other_authors() {
        let f = fixture();
        f.attachments.set_post_author(5, "someone-else").await;
        let a = stage(&f, "a.pdf").await;
        assert!(matches!(
            f.service.finalize(5, &teacher(), vec![a]).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_download_url_counts_downloads() {
        let f = fixture();
        f.attachments.set_post_author(5, "t1").await;
        let a = stage(&f, "수업 자료.pdf").await;
        let outcome = f.service.finalize(5, &teacher(), vec![a]).await.unwrap();
        let id = outcome.processed[0].id;

        let link = f.service.download_url(id, None).await.unwrap();
        assert_eq!(link.expires_in_secs, 900);
        assert!(link.url.contains("expires=900"));
        assert!(link.url.contains("response-content-disposition="));
        f.service.download_url(id, Some(Duration::from_secs(60))).await.unwrap();

        let row = f.attachments.get(id).await.unwrap().unwrap();
        assert_eq!(row.download_count, 2);
        assert!(matches!(
            f.service.download_url(999, None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_unknown_post_moves_nothing() {
        let f = fixture();
        let a = stage(&f, "a.pdf").await;

        let admin = UploadContext::new("admin-1", Role::Admin, "center-1");
        for ctx in [teacher(), admin] {
            assert!(matches!(
                f.service.finalize(404, &ctx, vec![a.clone()]).await,
                Err(AppError::NotFound(_))
            ));
        }
        assert_eq!(f.storage.keys().await, vec![a.temp_key]);
    }

    #[tokio::test]
    async fn test_failed_insert_restores_temp_object() {
        let f = fixture();
        f.attachments.set_post_author(5, "t1").await;
        f.attachments.fail_inserts(true);
        let a = stage(&f, "a.pdf").await;

        let outcome = f.service.finalize(5, &teacher(), vec![a.clone()]).await.unwrap();

        assert!(outcome.processed.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(f.storage.keys().await, vec![a.temp_key.clone()]);

        // The restored upload can be finalized once the store recovers
        f.attachments.fail_inserts(false);
        let outcome = f.service.finalize(5, &teacher(), vec![a]).await.unwrap();
        assert_eq!(outcome.processed.len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_refuses_other_tenants_uploads() {
        let f = fixture_with(KeyLayout::new(true));
        f.attachments.set_post_author(5, "t1").await;
        let own = stage(&f, "own.pdf").await;
        let foreign = stage_for(&f, "center-2", "theirs.pdf").await;

        let outcome = f
            .service
            .finalize(5, &teacher(), vec![own, foreign.clone()])
            .await
            .unwrap();

        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].temp_key, foreign.temp_key);
        assert!(f.storage.contains(&foreign.temp_key).await);
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let f = fixture();
        f.attachments.set_post_author(5, "t1").await;
        let a = stage(&f, "a.pdf").await;
        let outcome = f.service.finalize(5, &teacher(), vec![a]).await.unwrap();
        let attachment = outcome.processed[0].clone();

        let stranger = UploadContext::new("s1", Role::Student, "center-1");
        assert!(matches!(
            f.service.delete(attachment.id, &stranger).await,
            Err(AppError::Forbidden(_))
        ));

        let manager = UploadContext::new("m1", Role::Manager, "center-1");
        f.service.delete(attachment.id, &manager).await.unwrap();
        assert!(!f.storage.exists(&attachment.stored_key).await.unwrap());
        assert!(f.attachments.get(attachment.id).await.unwrap().is_none());
    }
}
