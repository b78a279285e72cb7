//! Error types module
//!
//! All failures surfaced by the upload pipeline are unified under `AppError`.
//! Variants map to distinct kinds (validation, quota, rate limit, storage backend,
//! reference extraction) so callers branch on the kind instead of on messages.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;
use std::time::Duration;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::{format_bytes, QuotaSnapshot};
use crate::violation::UploadViolation;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "QUOTA_EXCEEDED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Aggregated pre-storage rejection. Never a partial success.
    #[error("Upload rejected: {}", join_violations(.0))]
    Validation(Vec<UploadViolation>),

    #[error("Storage quota exceeded: {}", quota_message(.snapshot, .incoming_bytes))]
    QuotaExceeded {
        snapshot: QuotaSnapshot,
        incoming_bytes: u64,
    },

    #[error("Rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited {
        retry_after: Duration,
        violations: Vec<UploadViolation>,
    },

    #[error("Storage backend error{}: {message}", key_suffix(.key))]
    StorageBackend {
        key: Option<String>,
        message: String,
    },

    #[error("Malformed structured content in row {content_id}: {message}")]
    ReferenceExtraction { content_id: i64, message: String },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

fn quota_message(snapshot: &QuotaSnapshot, incoming_bytes: &u64) -> String {
    format!(
        "{} used of {}, {} incoming",
        format_bytes(snapshot.used_bytes),
        format_bytes(snapshot.limit_bytes),
        format_bytes(*incoming_bytes)
    )
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_deref()
        .map(|k| format!(" for '{}'", k))
        .unwrap_or_default()
}

fn join_violations(violations: &[UploadViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    /// Build the rejection for a non-empty violation list. A list made only of
    /// rate-limit violations becomes `RateLimited`, anything else `Validation`.
    pub fn from_violations(violations: Vec<UploadViolation>) -> Self {
        let retry_after = violations
            .iter()
            .map(|v| v.retry_after_secs())
            .collect::<Option<Vec<_>>>()
            .and_then(|secs| secs.into_iter().max());

        match retry_after {
            Some(secs) if !violations.is_empty() => AppError::RateLimited {
                retry_after: Duration::from_secs(secs),
                violations,
            },
            _ => AppError::Validation(violations),
        }
    }

    pub fn storage(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::StorageBackend {
            key: Some(key.into()),
            message: err.to_string(),
        }
    }

    /// Structured violations carried by this error, if any.
    pub fn violations(&self) -> &[UploadViolation] {
        match self {
            AppError::Validation(v) => v,
            AppError::RateLimited { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::QuotaExceeded { .. } => "QuotaExceeded",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::StorageBackend { .. } => "StorageBackend",
            AppError::ReferenceExtraction { .. } => "ReferenceExtraction",
            AppError::Database(_) => "Database",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Validation(_) => (
            400,
            "VALIDATION_FAILED",
            false,
            Some("Fix every listed problem and upload again"),
            false,
            LogLevel::Debug,
        ),
        AppError::QuotaExceeded { .. } => (
            413,
            "QUOTA_EXCEEDED",
            false,
            Some("Delete unused files or contact an administrator"),
            false,
            LogLevel::Warn,
        ),
        AppError::RateLimited { .. } => (
            429,
            "RATE_LIMITED",
            true,
            Some("Wait for the retry-after period and try again"),
            false,
            LogLevel::Warn,
        ),
        AppError::StorageBackend { .. } => (
            502,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::ReferenceExtraction { .. } => (
            500,
            "REFERENCE_EXTRACTION_ERROR",
            false,
            Some("Repair the malformed content row"),
            true,
            LogLevel::Warn,
        ),
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "FORBIDDEN",
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(_) | AppError::QuotaExceeded { .. } => self.to_string(),
            AppError::RateLimited { retry_after, .. } => format!(
                "Too many uploads. Try again in {} minute(s)",
                retry_after.as_secs().div_ceil(60).max(1)
            ),
            AppError::StorageBackend { .. } => "Failed to access storage".to_string(),
            AppError::ReferenceExtraction { .. } => "Stored content is malformed".to_string(),
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::InvalidInput(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::Forbidden(ref msg)
            | AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
