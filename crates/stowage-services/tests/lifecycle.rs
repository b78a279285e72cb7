//! End-to-end upload lifecycle against in-memory storage and stores.

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use stowage_core::{
    AppError, Config, ContentRow, Role, StorageBackend, StowageConfig, UploadContext,
    UploadViolation,
};
use stowage_db::{InMemoryAttachmentStore, InMemoryContentStore};
use stowage_services::{PendingAttachment, QuotaProvider, StowageServices, UploadRequest};
use stowage_storage::keys::{is_permanent_key, is_temp_key};
use stowage_storage::{InMemoryStorage, Storage, StorageOp};

struct Harness {
    storage: Arc<InMemoryStorage>,
    attachments: Arc<InMemoryAttachmentStore>,
    content: Arc<InMemoryContentStore>,
    services: StowageServices,
}

fn harness(configure: impl FnOnce(&mut StowageConfig)) -> Harness {
    let mut config = StowageConfig {
        storage_backend: StorageBackend::Memory,
        ..Default::default()
    };
    configure(&mut config);
    let config = Config(Box::new(config));

    let storage = Arc::new(InMemoryStorage::new());
    let attachments = InMemoryAttachmentStore::new();
    let content = InMemoryContentStore::new();
    let services = StowageServices::build(
        &config,
        storage.clone(),
        attachments.clone(),
        content.clone(),
    );
    Harness {
        storage,
        attachments,
        content,
        services,
    }
}

fn teacher() -> UploadContext {
    UploadContext::new("teacher-1", Role::Teacher, "center-1").with_ip("192.0.2.10".parse().unwrap())
}

fn request(ctx: UploadContext, name: &str, mime: &str, size: usize) -> UploadRequest {
    UploadRequest {
        ctx,
        original_name: name.to_string(),
        mime_type: mime.to_string(),
        data: Bytes::from(vec![7u8; size]),
        board: Some("education".to_string()),
    }
}

#[tokio::test]
async fn accepted_uploads_land_in_temp() {
    let h = harness(|_| {});
    for (name, mime) in [
        ("notes.pdf", "application/pdf"),
        ("photo.gif", "image/gif"),
        ("bundle.zip", "application/zip"),
        ("main.py", "text/plain"),
    ] {
        let staged = h
            .services
            .uploads
            .upload(request(teacher(), name, mime, 64))
            .await
            .unwrap();
        assert!(is_temp_key(&staged.object.key), "{}", staged.object.key);
        assert!(!is_permanent_key(&staged.object.key));
        assert!(staged.object.key.contains("/temp/"));
    }
}

#[tokio::test]
async fn rejected_uploads_write_nothing() {
    let h = harness(|_| {});
    let err = h
        .services
        .uploads
        .upload(request(teacher(), "payload.js", "image/png", 64))
        .await
        .unwrap_err();
    assert!(matches!(&err, AppError::Validation(v) if v.contains(&UploadViolation::ForbiddenExtension { extension: ".js".to_string() })));
    assert!(h.storage.keys().await.is_empty());
}

#[tokio::test]
async fn ip_limit_bans_then_recovers_through_the_service() {
    let h = harness(|c| c.ip_rate_limit.max_uploads_per_minute = 2);
    for _ in 0..2 {
        h.services
            .uploads
            .upload(request(teacher(), "a.png", "image/png", 10))
            .await
            .unwrap();
    }
    let err = h
        .services
        .uploads
        .upload(request(teacher(), "a.png", "image/png", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));

    // A different address is unaffected
    let other = UploadContext::new("teacher-2", Role::Teacher, "center-1")
        .with_ip("192.0.2.99".parse().unwrap());
    assert!(h
        .services
        .uploads
        .upload(request(other, "a.png", "image/png", 10))
        .await
        .is_ok());
}

#[tokio::test]
async fn quota_blocks_before_any_write() {
    let h = harness(|c| c.quota_limit_bytes = 100);
    let staged = h
        .services
        .uploads
        .upload(request(teacher(), "a.png", "image/png", 60))
        .await
        .unwrap();

    // Unreferenced temp objects do not count
    assert_eq!(h.services.quota.usage("center-1").await.unwrap().used_bytes, 0);

    h.content
        .push(ContentRow {
            id: 1,
            tenant_id: "center-1".to_string(),
            body_markup: Some(format!(r#"<img src="{}">"#, staged.url)),
            ..Default::default()
        })
        .await;
    assert_eq!(h.services.quota.usage("center-1").await.unwrap().used_bytes, 60);

    // used + incoming == limit is allowed
    h.services
        .uploads
        .upload(request(teacher(), "b.png", "image/png", 40))
        .await
        .unwrap();

    let before = h.storage.keys().await.len();
    let err = h
        .services
        .uploads
        .upload(request(teacher(), "c.png", "image/png", 41))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { incoming_bytes: 41, .. }));
    assert_eq!(h.storage.keys().await.len(), before);
}

#[tokio::test]
async fn post_finalize_rewrites_body_and_promotes_once() {
    let h = harness(|_| {});
    let first = h
        .services
        .uploads
        .upload(request(teacher(), "one.png", "image/png", 10))
        .await
        .unwrap();
    let second = h
        .services
        .uploads
        .upload(request(teacher(), "two.png", "image/png", 10))
        .await
        .unwrap();
    h.storage
        .fail_on(StorageOp::Copy, &second.object.key)
        .await;

    let body = format!(
        r#"<p><img src="{}"></p><p><img src="{}"></p>"#,
        first.url, second.url
    );
    let outcome = h.services.staging.rewrite_markup(&body).await;
    assert_eq!(outcome.promoted.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.body.contains(&outcome.promoted[0].url));
    assert!(outcome.body.contains(&second.url));
    assert!(!outcome.body.contains(&first.url));

    // The first object already moved; promoting it again fails cleanly
    assert!(h.services.staging.promote(&first.object.key).await.is_err());
    assert!(h.storage.contains(&second.object.key).await);
}

#[tokio::test]
async fn finalize_attachments_then_download() {
    let h = harness(|_| {});
    h.attachments.set_post_author(42, "teacher-1").await;
    let staged = h
        .services
        .uploads
        .upload(request(teacher(), "worksheet.pdf", "application/pdf", 2048))
        .await
        .unwrap();

    let outcome = h
        .services
        .attachments
        .finalize(
            42,
            &teacher(),
            vec![PendingAttachment {
                temp_key: staged.object.key.clone(),
                original_name: "worksheet.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(outcome.processed.len(), 1);
    let attachment = &outcome.processed[0];
    assert!(is_permanent_key(&attachment.stored_key));
    assert!(!h.storage.contains(&staged.object.key).await);

    let link = h
        .services
        .attachments
        .download_url(attachment.id, None)
        .await
        .unwrap();
    assert_eq!(link.expires_in_secs, 900);
    assert_eq!(link.file_name, "worksheet.pdf");
}

#[tokio::test]
async fn temp_sweep_and_orphan_report() {
    let h = harness(|_| {});
    let now = Utc::now();
    h.storage
        .insert_at("image/temp/stale.png", vec![1u8; 3], now - ChronoDuration::hours(25))
        .await;
    h.storage
        .insert_at("image/temp/fresh.png", vec![1u8; 3], now - ChronoDuration::hours(1))
        .await;
    for key in ["image/2024/05/A.png", "image/2024/05/B.png", "image/2024/05/C.png"] {
        h.storage.insert_at(key, vec![1u8; 3], now).await;
    }
    h.content
        .push(ContentRow {
            id: 1,
            tenant_id: "center-1".to_string(),
            thumbnail_url: Some(h.storage.url_for("image/2024/05/A.png")),
            body_tree: Some(
                serde_json::json!({
                    "type": "doc",
                    "content": [{"type": "image", "attrs": {"src": h.storage.url_for("image/2024/05/B.png")}}]
                })
                .to_string(),
            ),
            ..Default::default()
        })
        .await;

    let report = h.services.sweeper.sweep_temp_at(now).await;
    assert_eq!(report.deleted, 1);
    assert!(!h.storage.contains("image/temp/stale.png").await);
    assert!(h.storage.contains("image/temp/fresh.png").await);

    let orphans = h
        .services
        .sweeper
        .orphan_report_all("center-1", "image/")
        .await
        .unwrap();
    let keys: Vec<_> = orphans.orphans.iter().map(|o| o.key.clone()).collect();
    assert_eq!(keys, vec!["image/2024/05/C.png".to_string()]);
    assert!(h.storage.contains("image/2024/05/C.png").await);
}

#[tokio::test]
async fn quota_cache_serves_stale_until_invalidated() {
    let h = harness(|c| c.quota_cache_ttl_secs = 300);
    let staged = h
        .services
        .uploads
        .upload(request(teacher(), "a.png", "image/png", 1024))
        .await
        .unwrap();
    assert_eq!(h.services.quota.usage("center-1").await.unwrap().used_bytes, 0);

    h.content
        .push(ContentRow {
            id: 1,
            tenant_id: "center-1".to_string(),
            thumbnail_url: Some(staged.url.clone()),
            ..Default::default()
        })
        .await;
    assert_eq!(h.services.quota.usage("center-1").await.unwrap().used_bytes, 0);

    h.services.quota.invalidate("center-1").await;
    assert_eq!(
        h.services.quota.usage("center-1").await.unwrap().used_bytes,
        1024
    );
    // The uncached manager always reads live state
    assert_eq!(
        h.services
            .quota_manager
            .stats("center-1")
            .await
            .unwrap()
            .referenced_objects,
        1
    );
}
