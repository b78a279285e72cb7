use super::store::RateLimitStore;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use stowage_core::policy::{IpRateLimitPolicy, RATE_WINDOW};
use stowage_core::UploadViolation;

/// Sliding one-minute window per client address with a temporary ban once the
/// threshold is hit.
#[derive(Clone)]
pub struct IpRateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: IpRateLimitPolicy,
}

impl IpRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: IpRateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &IpRateLimitPolicy {
        &self.policy
    }

    pub async fn check(&self, ip: IpAddr) -> Result<(), UploadViolation> {
        self.check_at(ip, Utc::now()).await
    }

    /// Admit or reject an upload attempt from `ip` at `now`. Admitted attempts
    /// are recorded; rejected ones are not.
    #[tracing::instrument(skip(self), fields(client.ip = %ip))]
    pub async fn check_at(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<(), UploadViolation> {
        if !self.policy.enabled || self.policy.whitelist.contains(&ip) {
            return Ok(());
        }
        if self.policy.blacklist.contains(&ip) {
            tracing::warn!("Upload attempt from blacklisted address");
            return Err(UploadViolation::IpBlocked);
        }

        let key = ip.to_string();
        match self.evaluate(&key, now).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit store failed, admitting request");
                Ok(())
            }
        }
    }

    async fn evaluate(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<(), UploadViolation>, super::RateLimitStoreError> {
        if let Some(until) = self.store.active_ban(key, now).await? {
            return Ok(Err(UploadViolation::IpBanned {
                retry_after_secs: ceil_secs(until - now),
            }));
        }

        let window = chrono::Duration::from_std(RATE_WINDOW).unwrap_or(chrono::Duration::seconds(60));
        let count = self.store.prune_and_count(key, now - window).await?;
        if count >= self.policy.max_uploads_per_minute {
            let ban = chrono::Duration::from_std(self.policy.ban_duration)
                .unwrap_or(chrono::Duration::hours(1));
            self.store.ban(key, now + ban).await?;
            tracing::warn!(
                count,
                limit = self.policy.max_uploads_per_minute,
                "Upload rate exceeded, banning address"
            );
            return Ok(Err(UploadViolation::IpRateExceeded {
                limit: self.policy.max_uploads_per_minute,
                retry_after_secs: ceil_secs(ban),
            }));
        }

        self.store.record(key, now).await?;
        Ok(Ok(()))
    }
}

fn ceil_secs(d: chrono::Duration) -> u64 {
    let millis = d.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}
