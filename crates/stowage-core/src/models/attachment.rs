//! Attachment rows owned by the relational collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finalized post attachment. `stored_key` always points at a permanent key
/// once its post has been finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Attachment {
    pub id: i64,
    pub post_id: i64,
    pub tenant_id: String,
    pub user_id: String,
    pub original_name: String,
    pub stored_key: String,
    pub size: i64,
    pub mime_type: String,
    pub url: String,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Values needed to insert an attachment row.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub post_id: i64,
    pub tenant_id: String,
    pub user_id: String,
    pub original_name: String,
    pub stored_key: String,
    pub size: i64,
    pub mime_type: String,
    pub url: String,
}

/// Rolling upload totals for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUsage {
    pub count: u64,
    pub total_bytes: u64,
}
