//! Configuration module
//!
//! Settings are read from the environment (after loading `.env` through dotenvy).
//! Every optional variable has a documented default below.

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::policy::{ContentScanPolicy, IpRateLimitPolicy, GB, MB};
use crate::references::ExtractionFailurePolicy;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_BODY_BYTES: u64 = 210 * MB;
const QUOTA_LIMIT_BYTES: u64 = 30 * GB;
const TEMP_TTL_HOURS: u64 = 24;
const SWEEP_INTERVAL_SECS: u64 = 3600;
const SWEEP_BATCH_SIZE: usize = 1000;
const LIST_PAGE_SIZE: usize = 1000;
const DOWNLOAD_URL_TTL_SECS: u64 = 900;

/// Settings shared by every binary.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub max_upload_body_bytes: u64,
}

/// Upload governance and storage lifecycle settings.
#[derive(Clone, Debug)]
pub struct StowageConfig {
    pub base: BaseConfig,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub tenant_scoped_keys: bool,
    // Quota
    pub quota_limit_bytes: u64,
    pub quota_extraction_policy: ExtractionFailurePolicy,
    /// 0 disables the usage cache.
    pub quota_cache_ttl_secs: u64,
    // Temp lifecycle and sweeps
    pub temp_ttl_hours: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub list_page_size: usize,
    pub download_url_ttl_secs: u64,
    // Abuse controls
    pub ip_rate_limit: IpRateLimitPolicy,
    pub content_scan: ContentScanPolicy,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<StowageConfig>);

impl Config {
    fn inner(&self) -> &StowageConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = StowageConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().base.database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn max_upload_body_bytes(&self) -> u64 {
        self.inner().base.max_upload_body_bytes
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> &str {
        &self.inner().s3_region
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.inner().local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.inner().local_storage_base_url
    }

    pub fn tenant_scoped_keys(&self) -> bool {
        self.inner().tenant_scoped_keys
    }

    pub fn quota_limit_bytes(&self) -> u64 {
        self.inner().quota_limit_bytes
    }

    pub fn quota_extraction_policy(&self) -> ExtractionFailurePolicy {
        self.inner().quota_extraction_policy
    }

    pub fn quota_cache_ttl(&self) -> Option<Duration> {
        match self.inner().quota_cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn temp_ttl(&self) -> Duration {
        Duration::from_secs(self.inner().temp_ttl_hours * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.inner().sweep_interval_secs)
    }

    pub fn sweep_batch_size(&self) -> usize {
        self.inner().sweep_batch_size
    }

    pub fn list_page_size(&self) -> usize {
        self.inner().list_page_size
    }

    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.inner().download_url_ttl_secs)
    }

    pub fn ip_rate_limit(&self) -> &IpRateLimitPolicy {
        &self.inner().ip_rate_limit
    }

    pub fn content_scan(&self) -> ContentScanPolicy {
        self.inner().content_scan
    }
}

/// Read `name`, falling back to `default` when unset or unparsable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_ip_list(name: &str) -> Result<Vec<IpAddr>, anyhow::Error> {
    let Ok(raw) = env::var(name) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("{} contains invalid address '{}': {}", name, s, e))
        })
        .collect()
}

/// The documented defaults with no database and the local backend.
impl Default for StowageConfig {
    fn default() -> Self {
        StowageConfig {
            base: BaseConfig {
                environment: "development".to_string(),
                server_port: SERVER_PORT,
                cors_origins: vec!["*".to_string()],
                database_url: None,
                db_max_connections: MAX_CONNECTIONS,
                db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
                max_upload_body_bytes: MAX_UPLOAD_BODY_BYTES,
            },
            storage_backend: StorageBackend::Local,
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            local_storage_path: "./storage".to_string(),
            local_storage_base_url: "http://localhost:3000/files".to_string(),
            tenant_scoped_keys: false,
            quota_limit_bytes: QUOTA_LIMIT_BYTES,
            quota_extraction_policy: ExtractionFailurePolicy::default(),
            quota_cache_ttl_secs: 0,
            temp_ttl_hours: TEMP_TTL_HOURS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            sweep_batch_size: SWEEP_BATCH_SIZE,
            list_page_size: LIST_PAGE_SIZE,
            download_url_ttl_secs: DOWNLOAD_URL_TTL_SECS,
            ip_rate_limit: IpRateLimitPolicy::default(),
            content_scan: ContentScanPolicy::default(),
        }
    }
}

impl StowageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let quota_extraction_policy = match env::var("QUOTA_EXTRACTION_POLICY") {
            Ok(raw) => raw.parse::<ExtractionFailurePolicy>()?,
            Err(_) => ExtractionFailurePolicy::default(),
        };

        let ip_defaults = IpRateLimitPolicy::default();
        let ip_rate_limit = IpRateLimitPolicy {
            enabled: env_flag("IP_RATE_LIMIT_ENABLED", ip_defaults.enabled),
            max_uploads_per_minute: env_or(
                "IP_UPLOADS_PER_MINUTE",
                ip_defaults.max_uploads_per_minute,
            ),
            ban_duration: Duration::from_secs(env_or(
                "IP_BAN_DURATION_SECS",
                ip_defaults.ban_duration.as_secs(),
            )),
            whitelist: env_ip_list("IP_WHITELIST")?,
            blacklist: env_ip_list("IP_BLACKLIST")?,
        };

        let content_scan = ContentScanPolicy {
            enabled: env_flag("CONTENT_SCAN_ENABLED", false),
            ..ContentScanPolicy::default()
        };

        Ok(StowageConfig {
            base: BaseConfig {
                environment,
                server_port: env_or("SERVER_PORT", SERVER_PORT),
                cors_origins,
                database_url: env::var("DATABASE_URL").ok(),
                db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
                db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
                max_upload_body_bytes: env_or("MAX_UPLOAD_BODY_BYTES", MAX_UPLOAD_BODY_BYTES),
            },
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| "./storage".to_string()),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/files".to_string()),
            tenant_scoped_keys: env_flag("TENANT_SCOPED_KEYS", false),
            quota_limit_bytes: env_or("QUOTA_LIMIT_BYTES", QUOTA_LIMIT_BYTES),
            quota_extraction_policy,
            quota_cache_ttl_secs: env_or("QUOTA_CACHE_TTL_SECS", 0),
            temp_ttl_hours: env_or("TEMP_TTL_HOURS", TEMP_TTL_HOURS),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", SWEEP_INTERVAL_SECS),
            sweep_batch_size: env_or("SWEEP_BATCH_SIZE", SWEEP_BATCH_SIZE),
            list_page_size: env_or("LIST_PAGE_SIZE", LIST_PAGE_SIZE),
            download_url_ttl_secs: env_or("DOWNLOAD_URL_TTL_SECS", DOWNLOAD_URL_TTL_SECS),
            ip_rate_limit,
            content_scan,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage_backend == StorageBackend::S3 && self.s3_bucket.is_none() {
            return Err(anyhow::anyhow!(
                "STORAGE_BACKEND=s3 requires S3_BUCKET to be set"
            ));
        }

        if let Some(url) = self.base.database_url.as_deref() {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.sweep_batch_size == 0 || self.sweep_batch_size > 1000 {
            return Err(anyhow::anyhow!(
                "SWEEP_BATCH_SIZE must be between 1 and 1000"
            ));
        }

        if self.list_page_size == 0 {
            return Err(anyhow::anyhow!("LIST_PAGE_SIZE must be greater than 0"));
        }

        if self.temp_ttl_hours == 0 {
            return Err(anyhow::anyhow!("TEMP_TTL_HOURS must be greater than 0"));
        }

        if self.ip_rate_limit.enabled && self.ip_rate_limit.max_uploads_per_minute == 0 {
            return Err(anyhow::anyhow!(
                "IP_UPLOADS_PER_MINUTE must be greater than 0 when the limiter is enabled"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StowageConfig {
        let mut config = StowageConfig::default();
        config.base.database_url = Some("postgres://localhost/stowage".to_string());
        config
    }

    #[test]
    fn test_valid_sample() {
        assert!(sample().validate().is_ok());
        let config = Config(Box::new(sample()));
        assert_eq!(config.temp_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.quota_cache_ttl(), None);
        assert!(!config.is_production());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let mut config = sample();
        config.storage_backend = StorageBackend::S3;
        assert!(config.validate().is_err());
        config.s3_bucket = Some("uploads".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_size_capped_at_backend_limit() {
        let mut config = sample();
        config.sweep_batch_size = 5000;
        assert!(config.validate().is_err());
    }
}
