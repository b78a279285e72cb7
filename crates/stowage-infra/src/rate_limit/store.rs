use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for per-key sliding windows and bans.
///
/// Implementations only need per-call consistency; a check followed by a record
/// is not atomic, so limits are advisory under concurrency.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Expiry of the key's ban if it is still active at `now`. A ban observed as
    /// expired is cleared together with the key's recorded timestamps.
    async fn active_ban(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, RateLimitStoreError>;

    /// Drop timestamps before `window_start` and return how many remain.
    async fn prune_and_count(
        &self,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<usize, RateLimitStoreError>;

    async fn record(&self, key: &str, at: DateTime<Utc>) -> Result<(), RateLimitStoreError>;

    async fn ban(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitStoreError>;
}

#[derive(Debug, Default)]
struct WindowState {
    timestamps: VecDeque<DateTime<Utc>>,
    banned_until: Option<DateTime<Utc>>,
}

/// Sharded in-memory store to reduce lock contention between unrelated keys.
#[derive(Clone)]
pub struct InMemoryRateLimitStore {
    shards: Vec<Arc<Mutex<HashMap<String, WindowState>>>>,
}

impl InMemoryRateLimitStore {
    /// Create a store with the default 16 shards.
    pub fn new() -> Self {
        Self::with_shards(16)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &str) -> &Arc<Mutex<HashMap<String, WindowState>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Remove keys with no timestamps at or after `window_start` and no ban
    /// active at `now`. Returns the number of evicted keys.
    pub async fn evict_idle(&self, now: DateTime<Utc>, window_start: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for shard in &self.shards {
            let mut states = shard.lock().await;
            let before = states.len();
            states.retain(|_, state| {
                let recent = state.timestamps.back().is_some_and(|t| *t >= window_start);
                let banned = state.banned_until.is_some_and(|until| now <= until);
                recent || banned
            });
            evicted += before - states.len();
        }
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle rate limit entries");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn active_ban(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, RateLimitStoreError> {
        let mut states = self.shard(key).lock().await;
        let Some(state) = states.get_mut(key) else {
            return Ok(None);
        };
        match state.banned_until {
            Some(until) if now <= until => Ok(Some(until)),
            Some(_) => {
                state.banned_until = None;
                state.timestamps.clear();
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn prune_and_count(
        &self,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<usize, RateLimitStoreError> {
        let mut states = self.shard(key).lock().await;
        let state = states.entry(key.to_string()).or_default();
        while state.timestamps.front().is_some_and(|t| *t < window_start) {
            state.timestamps.pop_front();
        }
        Ok(state.timestamps.len())
    }

    async fn record(&self, key: &str, at: DateTime<Utc>) -> Result<(), RateLimitStoreError> {
        let mut states = self.shard(key).lock().await;
        states
            .entry(key.to_string())
            .or_default()
            .timestamps
            .push_back(at);
        Ok(())
    }

    async fn ban(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitStoreError> {
        let mut states = self.shard(key).lock().await;
        states.entry(key.to_string()).or_default().banned_until = Some(until);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_expired_ban_clears_history() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        store.record("ip", now).await.unwrap();
        store.ban("ip", now + Duration::seconds(10)).await.unwrap();

        assert!(store.active_ban("ip", now).await.unwrap().is_some());
        assert!(store
            .active_ban("ip", now + Duration::seconds(11))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.prune_and_count("ip", now - Duration::seconds(60)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_drops_old_timestamps() {
        let store = InMemoryRateLimitStore::with_shards(2);
        let now = Utc::now();
        store.record("ip", now - Duration::seconds(90)).await.unwrap();
        store.record("ip", now - Duration::seconds(30)).await.unwrap();
        assert_eq!(store.prune_and_count("ip", now - Duration::seconds(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_active_entries() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        store.record("old", now - Duration::minutes(5)).await.unwrap();
        store.record("fresh", now).await.unwrap();
        store.ban("banned", now + Duration::minutes(5)).await.unwrap();

        let evicted = store.evict_idle(now, now - Duration::seconds(60)).await;
        assert_eq!(evicted, 1);
        assert_eq!(store.len().await, 2);
    }
}
