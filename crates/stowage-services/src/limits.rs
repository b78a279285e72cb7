//! Per-user rolling upload limits.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use stowage_core::{UploadContext, UploadViolation};
use stowage_db::AttachmentStore;

/// Rolling window over which per-user upload counts and volume are summed.
pub const USER_USAGE_WINDOW_HOURS: i64 = 24;

/// Compares a user's last 24 hours of persisted attachments against their
/// role's daily caps.
///
/// Usage is read, not reserved: two concurrent uploads from one user can both
/// pass before either is recorded.
#[derive(Clone)]
pub struct UserUploadLimiter {
    attachments: Arc<dyn AttachmentStore>,
}

impl UserUploadLimiter {
    pub fn new(attachments: Arc<dyn AttachmentStore>) -> Self {
        Self { attachments }
    }

    #[tracing::instrument(skip(self, ctx), fields(user.id = ?ctx.user_id, user.role = %ctx.role))]
    pub async fn check(
        &self,
        ctx: &UploadContext,
        incoming_bytes: u64,
        now: DateTime<Utc>,
    ) -> Vec<UploadViolation> {
        let Some(user_id) = ctx.user_id.as_deref() else {
            return vec![UploadViolation::MissingUser];
        };

        let since = now - Duration::hours(USER_USAGE_WINDOW_HOURS);
        let usage = match self.attachments.rolling_usage(user_id, since).await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read rolling upload usage");
                return vec![UploadViolation::UsageLookupFailed];
            }
        };

        let permissions = ctx.role.permissions();
        let mut violations = Vec::new();

        if usage.count >= permissions.max_files_per_post {
            violations.push(UploadViolation::DailyFileCountExceeded {
                count: usage.count,
                limit: permissions.max_files_per_post,
            });
        }

        let would_be = usage.total_bytes.saturating_add(incoming_bytes);
        if would_be > permissions.daily_upload_limit {
            violations.push(UploadViolation::DailyVolumeExceeded {
                would_be,
                limit: permissions.daily_upload_limit,
            });
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::policy::MB;
    use stowage_core::{NewAttachment, Role};
    use stowage_db::InMemoryAttachmentStore;

    fn attachment(user: &str, size: u64) -> NewAttachment {
        NewAttachment {
            post_id: 1,
            tenant_id: "center-1".to_string(),
            user_id: user.to_string(),
            original_name: "a.png".to_string(),
            stored_key: format!("image/2024/01/{}-{}.png", user, size),
            size: size as i64,
            mime_type: "image/png".to_string(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_requires_user() {
        let limiter = UserUploadLimiter::new(InMemoryAttachmentStore::new());
        let mut ctx = UploadContext::new("u1", Role::Student, "center-1");
        ctx.user_id = None;
        assert_eq!(
            limiter.check(&ctx, 1, Utc::now()).await,
            vec![UploadViolation::MissingUser]
        );
    }

    #[tokio::test]
    async fn test_counts_only_last_day() {
        let store = InMemoryAttachmentStore::new();
        let now = Utc::now();
        for _ in 0..5 {
            store
                .insert_at(attachment("u1", MB), now - Duration::hours(30))
                .await;
        }
        let limiter = UserUploadLimiter::new(store.clone());
        let ctx = UploadContext::new("u1", Role::Student, "center-1");
        assert!(limiter.check(&ctx, MB, now).await.is_empty());

        for i in 0..5 {
            store
                .insert_at(attachment("u1", MB + i), now - Duration::hours(1))
                .await;
        }
        assert_eq!(
            limiter.check(&ctx, MB, now).await,
            vec![UploadViolation::DailyFileCountExceeded { count: 5, limit: 5 }]
        );
    }

    #[tokio::test]
    async fn test_volume_limit() {
        let store = InMemoryAttachmentStore::new();
        let now = Utc::now();
        store.insert_at(attachment("u1", 45 * MB), now).await;
        let limiter = UserUploadLimiter::new(store);
        let ctx = UploadContext::new("u1", Role::Student, "center-1");

        assert!(limiter.check(&ctx, 5 * MB, now).await.is_empty());
        assert_eq!(
            limiter.check(&ctx, 5 * MB + 1, now).await,
            vec![UploadViolation::DailyVolumeExceeded {
                would_be: 50 * MB + 1,
                limit: 50 * MB
            }]
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_rejects() {
        let store = InMemoryAttachmentStore::new();
        store.fail_usage_lookups(true);
        let limiter = UserUploadLimiter::new(store);
        let ctx = UploadContext::new("u1", Role::Admin, "center-1");
        assert_eq!(
            limiter.check(&ctx, 1, Utc::now()).await,
            vec![UploadViolation::UsageLookupFailed]
        );
    }
}
