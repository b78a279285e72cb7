//! Stowage Database Library
//!
//! The relational collaborator: attachment rows (rolling usage, finalize,
//! download counts) and tenant content rows scanned for object references.
//! Services depend on the `AttachmentStore` / `ContentStore` traits; Postgres
//! repositories and in-memory stores implement them.

pub mod db;
pub mod memory;
pub mod pool;

pub use db::{AttachmentRepository, AttachmentStore, ContentRepository, ContentStore};
pub use memory::{InMemoryAttachmentStore, InMemoryContentStore};
pub use pool::setup_database;
