use crate::disposition::content_disposition;
use crate::traits::{ListPage, ObjectInfo, PutOptions, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Metadata written next to each object, under `.meta/{key}.json`.
const META_DIR: &str = ".meta";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    download_name: Option<String>,
}

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/stowage")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Convert storage key to filesystem path, rejecting traversal outside the
    /// base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains("..")
            || key.starts_with('/')
            || key.contains('\\')
            || key.starts_with(META_DIR)
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Ok(self.base_path.join(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.base_path.join(META_DIR).join(format!("{}.json", key))
    }

    async fn read_sidecar(&self, key: &str) -> Sidecar {
        match fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, key = %key, "Ignoring unreadable metadata sidecar");
                Sidecar::default()
            }),
            Err(_) => Sidecar::default(),
        }
    }

    async fn write_sidecar(&self, key: &str, sidecar: &Sidecar) -> StorageResult<()> {
        let path = self.meta_path(key);
        self.ensure_parent_dir(&path).await?;
        let raw = serde_json::to_vec(sidecar)
            .map_err(|e| StorageError::UploadFailed(format!("Failed to encode metadata: {}", e)))?;
        fs::write(&path, raw).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    async fn remove_sidecar(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.meta_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn info_for(&self, key: &str, path: &Path) -> StorageResult<ObjectInfo> {
        let metadata = fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(ObjectInfo {
            key: key.to_string(),
            size: metadata.len(),
            last_modified,
            content_type: self.read_sidecar(key).await.content_type,
        })
    }

    /// Every file below `dir`, as storage keys. Directories that vanish while
    /// walking are skipped.
    async fn collect_keys(&self, dir: PathBuf) -> StorageResult<Vec<(String, PathBuf)>> {
        let mut keys = Vec::new();
        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::ListFailed(e.to_string())),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != self.base_path.join(META_DIR) {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    if let Some(key) = self.path_to_key(&path) {
                        keys.push((key, path));
                    }
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Bytes, options: PutOptions) -> StorageResult<String> {
        let path = self.key_to_path(key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        let sidecar = Sidecar {
            content_type: options.content_type,
            download_name: options.download_name,
        };
        if sidecar.content_type.is_some() || sidecar.download_name.is_some() {
            self.write_sidecar(key, &sidecar).await?;
        } else {
            self.remove_sidecar(key).await?;
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let path = self.key_to_path(key)?;
        self.info_for(key, &path).await
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String> {
        let from_path = self.key_to_path(from_key)?;
        let to_path = self.key_to_path(to_key)?;

        self.ensure_parent_dir(&to_path).await?;

        fs::copy(&from_path, &to_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(from_key.to_string()),
            _ => StorageError::CopyFailed(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            )),
        })?;

        let sidecar = self.read_sidecar(from_key).await;
        if sidecar.content_type.is_some() || sidecar.download_name.is_some() {
            self.write_sidecar(to_key, &sidecar)
                .await
                .map_err(|e| StorageError::CopyFailed(e.to_string()))?;
        }

        tracing::debug!(from = %from_key, to = %to_key, "Local storage copy successful");

        Ok(self.url_for(to_key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                self.remove_sidecar(key).await?;
                tracing::debug!(key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.remove_sidecar(key).await,
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage> {
        if prefix.contains("..") || prefix.starts_with('/') {
            return Err(StorageError::InvalidKey(prefix.to_string()));
        }

        // Walk from the deepest directory fully contained in the prefix.
        let dir_part = prefix.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let root = if dir_part.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(dir_part)
        };

        let mut keys: Vec<(String, PathBuf)> = self
            .collect_keys(root)
            .await?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| start_after.map_or(true, |after| key.as_str() > after))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));

        let has_more = keys.len() > max_keys;
        keys.truncate(max_keys);

        let mut objects = Vec::with_capacity(keys.len());
        for (key, path) in keys {
            match self.info_for(&key, &path).await {
                Ok(info) => objects.push(info),
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let next_start_after = if has_more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_start_after,
        })
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        _expires_in: Duration,
        download_name: Option<&str>,
    ) -> StorageResult<String> {
        self.key_to_path(key)?;
        let url = self.url_for(key);
        let stored_name = match download_name {
            Some(_) => None,
            None => self.read_sidecar(key).await.download_name,
        };
        Ok(match download_name.or(stored_name.as_deref()) {
            Some(name) => format!(
                "{}?response-content-disposition={}",
                url,
                urlencoding::encode(&content_disposition(name))
            ),
            None => url,
        })
    }

    fn public_base_url(&self) -> String {
        self.base_url.clone()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
