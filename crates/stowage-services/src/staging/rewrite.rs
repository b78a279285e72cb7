use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use stowage_core::{AppError, ContentNode};
use stowage_storage::keys::is_temp_key;

use super::{Promotion, StagingStore};

/// A reference that could not be promoted and was left untouched.
#[derive(Debug, Clone, Serialize)]
pub struct FailedPromotion {
    pub url: String,
    pub error: String,
}

/// Result of rewriting a content body. A body can come back partially promoted.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteOutcome {
    pub body: String,
    pub promoted: Vec<Promotion>,
    pub failed: Vec<FailedPromotion>,
}

impl RewriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl StagingStore {
    /// Temp object URLs appearing anywhere in `text`, deduplicated, in order of
    /// first appearance.
    pub fn temp_urls_in(&self, text: &str) -> Vec<String> {
        let base = self.storage.public_base_url();
        let Ok(pattern) = Regex::new(&format!(r#"{}/[^\s"'<>()\\]+"#, regex::escape(&base)))
        else {
            return Vec::new();
        };

        let mut urls: Vec<String> = Vec::new();
        for m in pattern.find_iter(text) {
            let url = m.as_str();
            let is_temp = self
                .storage
                .key_from_url(url)
                .is_some_and(|key| is_temp_key(&key));
            if is_temp && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Promote every URL once. Returns old URL -> new URL for successes.
    async fn promote_urls(
        &self,
        urls: Vec<String>,
    ) -> (HashMap<String, String>, Vec<Promotion>, Vec<FailedPromotion>) {
        let mut replacements = HashMap::new();
        let mut promoted = Vec::new();
        let mut failed = Vec::new();

        for url in urls {
            let Some(key) = self.storage.key_from_url(&url) else {
                continue;
            };
            match self.promote(&key).await {
                Ok(promotion) => {
                    replacements.insert(url, promotion.url.clone());
                    promoted.push(promotion);
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %url, "Leaving reference on temp object");
                    failed.push(FailedPromotion {
                        url,
                        error: e.to_string(),
                    });
                }
            }
        }

        (replacements, promoted, failed)
    }

    /// Promote every temp object referenced by raw markup and substitute the
    /// permanent URLs. A failed promotion leaves that reference as it was and the
    /// rest are still processed.
    #[tracing::instrument(skip(self, markup), fields(markup.len = markup.len()))]
    pub async fn rewrite_markup(&self, markup: &str) -> RewriteOutcome {
        let urls = self.temp_urls_in(markup);
        let (replacements, promoted, failed) = self.promote_urls(urls).await;

        let mut body = markup.to_string();
        for (old, new) in &replacements {
            body = body.replace(old.as_str(), new);
        }

        RewriteOutcome {
            body,
            promoted,
            failed,
        }
    }

    /// Same as [`rewrite_markup`](Self::rewrite_markup) for a structured JSON
    /// document. Only image node sources are considered. Fails when the
    /// document is not valid JSON.
    #[tracing::instrument(skip(self, tree), fields(tree.len = tree.len()))]
    pub async fn rewrite_tree(&self, tree: &str) -> Result<RewriteOutcome, AppError> {
        let node = ContentNode::parse(tree)
            .map_err(|e| AppError::InvalidInput(format!("Malformed structured content: {}", e)))?;

        let mut urls: Vec<String> = Vec::new();
        for src in node.image_sources() {
            let is_temp = self
                .storage
                .key_from_url(src)
                .is_some_and(|key| is_temp_key(&key));
            if is_temp && !urls.iter().any(|u| u == src) {
                urls.push(src.to_string());
            }
        }

        let (replacements, promoted, failed) = self.promote_urls(urls).await;
        let node = node.rewrite_sources(&mut |src| replacements.get(src).cloned());
        let body = serde_json::to_string(&node.into_value())?;

        Ok(RewriteOutcome {
            body,
            promoted,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use stowage_core::Category;
    use stowage_storage::{InMemoryStorage, KeyLayout, Storage, StorageOp};

    async fn setup(n: usize) -> (Arc<InMemoryStorage>, StagingStore, Vec<String>) {
        let storage = Arc::new(InMemoryStorage::new());
        let store = StagingStore::new(storage.clone(), KeyLayout::default());
        let mut urls = Vec::new();
        for i in 0..n {
            let staged = store
                .create(
                    "center-1",
                    Category::Image,
                    &format!("img{}.png", i),
                    "image/png",
                    Bytes::from(vec![0u8; 10]),
                )
                .await
                .unwrap();
            urls.push(staged.url);
        }
        (storage, store, urls)
    }

    #[tokio::test]
    async fn test_partial_promotion_rewrites_only_successes() {
        let (storage, store, urls) = setup(2).await;
        let failing_key = storage.key_from_url(&urls[1]).unwrap();
        storage.fail_on(StorageOp::Copy, &failing_key).await;

        let markup = format!(
            r#"<p><img src="{}"> and <img src="{}"></p>"#,
            urls[0], urls[1]
        );
        let outcome = store.rewrite_markup(&markup).await;

        assert_eq!(outcome.promoted.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].url, urls[1]);
        assert!(!outcome.body.contains(&urls[0]));
        assert!(outcome.body.contains(&outcome.promoted[0].url));
        assert!(outcome.body.contains(&urls[1]));
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_repeated_reference_promoted_once() {
        let (storage, store, urls) = setup(1).await;
        let markup = format!(
            r#"<img src="{0}"><a href="{0}">full size</a>"#,
            urls[0]
        );
        let outcome = store.rewrite_markup(&markup).await;

        assert_eq!(outcome.promoted.len(), 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.body.matches(&outcome.promoted[0].url).count(), 2);
        assert_eq!(storage.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_foreign_and_permanent_urls() {
        let (_, store, _) = setup(0).await;
        let markup = r#"<img src="https://cdn.example.com/x.png"><img src="memory://stowage/image/2024/01/a.png">"#;
        assert!(store.temp_urls_in(markup).is_empty());
        let outcome = store.rewrite_markup(markup).await;
        assert_eq!(outcome.body, markup);
    }

    #[tokio::test]
    async fn test_rewrite_tree() {
        let (storage, store, urls) = setup(2).await;
        let failing_key = storage.key_from_url(&urls[1]).unwrap();
        storage.fail_on(StorageOp::Copy, &failing_key).await;

        let tree = json!({
            "type": "doc",
            "content": [
                {"type": "image", "attrs": {"src": urls[0], "alt": "first"}},
                {"type": "paragraph", "content": [
                    {"type": "image", "attrs": {"src": urls[1]}},
                    {"type": "text", "text": "hello"}
                ]},
                {"type": "embed", "content": "not a list"}
            ]
        })
        .to_string();

        let outcome = store.rewrite_tree(&tree).await.unwrap();
        let body: Value = serde_json::from_str(&outcome.body).unwrap();

        assert_eq!(body["content"][0]["attrs"]["src"], outcome.promoted[0].url.as_str());
        assert_eq!(body["content"][0]["attrs"]["alt"], "first");
        assert_eq!(body["content"][1]["content"][0]["attrs"]["src"], urls[1].as_str());
        assert_eq!(body["content"][1]["content"][1]["text"], "hello");
        assert_eq!(body["content"][2]["content"], "not a list");
        assert_eq!(outcome.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_rewrite_tree_rejects_malformed_json() {
        let (_, store, _) = setup(0).await;
        assert!(matches!(
            store.rewrite_tree("{not json").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
