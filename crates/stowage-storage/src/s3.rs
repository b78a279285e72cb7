use crate::disposition::content_disposition;
use crate::sigv4::{presign_get, SigningKey};
use crate::traits::{ListPage, ObjectInfo, PutOptions, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectMeta, ObjectStore, ObjectStoreExt,
    PutOptions as ObjectPutOptions, PutPayload, Result as ObjectResult,
};
use std::collections::HashSet;
use std::time::Duration;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        Self::with_builder(AmazonS3Builder::from_env(), bucket, region, endpoint_url)
    }

    /// Build on top of a preconfigured builder, e.g. one carrying explicit
    /// credentials or retry settings.
    pub fn with_builder(
        builder: AmazonS3Builder,
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = builder
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    /// Object path for a key, taken verbatim. `Path::from` would percent-encode
    /// characters such as `%` and store the object under a different name.
    fn location(key: &str) -> StorageResult<Path> {
        Path::parse(key).map_err(|e| StorageError::InvalidKey(format!("{}: {}", key, e)))
    }

    fn to_info(meta: ObjectMeta) -> ObjectInfo {
        ObjectInfo {
            key: meta.location.to_string(),
            size: meta.size as u64,
            last_modified: meta.last_modified,
            content_type: None,
        }
    }

    fn map_not_found(key: &str, e: ObjectStoreError, other: fn(String) -> StorageError) -> StorageError {
        match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            e => other(e.to_string()),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Bytes, options: PutOptions) -> StorageResult<String> {
        let size = data.len() as u64;
        let location = Self::location(key)?;
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        if let Some(content_type) = options.content_type {
            attributes.insert(Attribute::ContentType, AttributeValue::from(content_type));
        }
        // Copies keep object attributes, so the disposition survives promotion.
        if let Some(name) = options.download_name.as_deref() {
            attributes.insert(
                Attribute::ContentDisposition,
                AttributeValue::from(content_disposition(name)),
            );
        }
        let put_options = ObjectPutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), put_options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| Self::map_not_found(key, e, StorageError::DownloadFailed))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let location = Self::location(key)?;
        let result: ObjectResult<ObjectMeta> = self.store.head(&location).await;
        result
            .map(Self::to_info)
            .map_err(|e| Self::map_not_found(key, e, StorageError::BackendError))
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String> {
        let start = std::time::Instant::now();
        let from = Self::location(from_key)?;
        let to = Self::location(to_key)?;

        let result: ObjectResult<_> = self.store.copy(&from, &to).await;
        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                from = %from_key,
                to = %to_key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 copy failed"
            );
            Self::map_not_found(from_key, e, StorageError::CopyFailed)
        })?;

        Ok(self.url_for(to_key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::debug!(
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete successful"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage> {
        let prefix_path = Self::location(prefix.trim_end_matches('/'))?;
        let mut stream = match start_after {
            Some(after) => self
                .store
                .list_with_offset(Some(&prefix_path), &Self::location(after)?),
            None => self.store.list(Some(&prefix_path)),
        };

        let mut objects = Vec::with_capacity(max_keys.min(1000));
        let mut has_more = false;
        while let Some(item) = stream.next().await {
            let meta = item.map_err(|e| StorageError::ListFailed(e.to_string()))?;
            if objects.len() == max_keys {
                has_more = true;
                break;
            }
            objects.push(Self::to_info(meta));
        }

        let next_start_after = if has_more {
            objects.last().map(|o: &ObjectInfo| o.key.clone())
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
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;
        let signed = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        let Some(name) = download_name else {
            return Ok(signed);
        };

        // Re-sign with the disposition override so the response carries the
        // requested filename whatever was stored at put time.
        let object_url = signed.split('?').next().unwrap_or_default();
        let credential = self
            .store
            .credentials()
            .get_credential()
            .await
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;
        let signing_key = SigningKey {
            key_id: &credential.key_id,
            secret_key: &credential.secret_key,
            token: credential.token.as_deref(),
        };
        let disposition = content_disposition(name);

        presign_get(
            object_url,
            &signing_key,
            &self.region,
            expires_in,
            &[("response-content-disposition", &disposition)],
            Utc::now(),
        )
    }

    /// Bulk delete through `delete_stream`, which batches up to 1000 keys per
    /// request. Missing objects count as deleted.
    async fn delete_many(&self, keys: &[String]) -> Vec<(String, StorageError)> {
        let mut failures = Vec::new();
        let mut locations = Vec::with_capacity(keys.len());
        for key in keys {
            match Self::location(key) {
                Ok(location) => locations.push(Ok(location)),
                Err(e) => failures.push((key.clone(), e)),
            }
        }
        if locations.is_empty() {
            return failures;
        }

        let start = std::time::Instant::now();
        let mut results = self
            .store
            .delete_stream(futures::stream::iter(locations).boxed());
        let mut confirmed = HashSet::new();
        let mut errors = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(path) => {
                    confirmed.insert(path.to_string());
                }
                Err(ObjectStoreError::NotFound { path, .. }) => {
                    confirmed.insert(path);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        for key in keys {
            if confirmed.contains(key) || failures.iter().any(|(k, _)| k == key) {
                continue;
            }
            let message = errors
                .iter()
                .find(|m| m.contains(key.as_str()))
                .or(errors.first())
                .cloned()
                .unwrap_or_else(|| "Deletion not confirmed by backend".to_string());
            failures.push((key.clone(), StorageError::DeleteFailed(message)));
        }

        tracing::info!(
            bucket = %self.bucket,
            requested = keys.len(),
            failed = failures.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 bulk delete finished"
        );
        failures
    }

    /// For AWS S3: `https://{bucket}.s3.{region}.amazonaws.com`.
    /// For S3-compatible providers, path-style `{endpoint}/{bucket}`.
    fn public_base_url(&self) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
