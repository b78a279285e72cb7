//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.
//! Services only ever use six primitives (put, get, head, copy, delete, paginated
//! list) plus signed download URLs.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object metadata attached at write time.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    /// Original filename, served back through `Content-Disposition`.
    pub download_name: Option<String>,
}

impl PutOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            download_name: None,
        }
    }

    pub fn with_download_name(mut self, name: impl Into<String>) -> Self {
        self.download_name = Some(name.into());
        self
    }
}

/// Result of a metadata-only fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// One page of a prefix listing, in ascending key order.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Pass back as `start_after` to fetch the next page. `None` on the last page.
    pub next_start_after: Option<String>,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem, memory) implement this trait.
/// Keys follow the layout documented at the crate root.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object and return its public URL.
    async fn put(&self, key: &str, data: Bytes, options: PutOptions) -> StorageResult<String>;

    /// Read a whole object.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Metadata-only fetch. Missing objects yield `StorageError::NotFound`.
    async fn head(&self, key: &str) -> StorageResult<ObjectInfo>;

    /// Server-side copy. Returns the public URL of the destination.
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List objects whose key starts with `prefix` and sorts after `start_after`.
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage>;

    /// Generate a short-lived GET URL. When `download_name` is given, the response
    /// is served as an attachment with that filename where the backend allows it.
    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> StorageResult<String>;

    /// Base URL that public object URLs are built from, without trailing slash.
    fn public_base_url(&self) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Public URL of a key. Each path segment is percent-encoded, so
    /// [`key_from_url`](Self::key_from_url) recovers the exact key.
    fn url_for(&self, key: &str) -> String {
        let path: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        format!("{}/{}", self.public_base_url(), path.join("/"))
    }

    /// Storage key behind a public URL, if the URL points into this backend.
    /// Inverse of [`url_for`](Self::url_for).
    fn key_from_url(&self, url: &str) -> Option<String> {
        let base = self.public_base_url();
        let rest = url.trim().strip_prefix(base.as_str())?.strip_prefix('/')?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        if rest.is_empty() {
            return None;
        }
        urlencoding::decode(rest).ok().map(|k| k.into_owned())
    }

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every key, one request per key. A failure is recorded and the
    /// remaining keys are still attempted. Returns the failures.
    async fn delete_many(&self, keys: &[String]) -> Vec<(String, StorageError)> {
        let mut failures = Vec::new();
        for key in keys {
            if let Err(e) = self.delete(key).await {
                failures.push((key.clone(), e));
            }
        }
        failures
    }
}
