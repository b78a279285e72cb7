//! Stowage Core Library
//!
//! Domain models, the static upload policy table, the error taxonomy, configuration
//! and content reference extraction shared by every Stowage crate.

pub mod config;
pub mod content_tree;
pub mod error;
pub mod models;
pub mod policy;
pub mod references;
pub mod storage_types;
pub mod violation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, StowageConfig};
pub use content_tree::ContentNode;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    format_bytes, Attachment, BoardKind, Category, ContentRow, FileCandidate, LifecycleState,
    NewAttachment, QuotaSnapshot, Role, StorageObject, UploadContext, UploadUsage,
};
pub use references::{ExtractionFailurePolicy, ReferenceExtractor, RowReferences};
pub use storage_types::StorageBackend;
pub use violation::UploadViolation;
