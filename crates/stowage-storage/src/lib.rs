//! Stowage Storage Library
//!
//! Object storage abstraction and backends (S3 through object_store, local
//! filesystem, in-memory).
//!
//! # Storage key format
//!
//! Every accepted upload lands under a temp prefix and is later promoted:
//!
//! - **Temp**: `{category}/temp/{uuid}{ext}`
//! - **Permanent**: `{category}/{yyyy}/{mm}/{uuid}{ext}`
//!
//! With tenant scoping enabled both layouts are rooted at `tenants/{tenant_id}/`.
//! Keys must not contain `..` or a leading `/`. Key generation and parsing live in
//! the `keys` module so every backend and service agrees on the layout.

pub mod disposition;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(feature = "storage-s3")]
pub mod sigv4;
pub mod traits;

// Re-export commonly used types
pub use disposition::content_disposition;
pub use factory::create_storage;
pub use keys::{KeyLayout, TempKey};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::{InMemoryStorage, StorageOp};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use stowage_core::StorageBackend;
pub use traits::{ListPage, ObjectInfo, PutOptions, Storage, StorageError, StorageResult};
