//! Content rows scanned for object references.

use serde::{Deserialize, Serialize};

/// A tenant's content row (e.g. a blog post). Only the fields that can embed
/// object references are loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ContentRow {
    pub id: i64,
    pub tenant_id: String,
    pub thumbnail_url: Option<String>,
    /// Raw HTML body.
    pub body_markup: Option<String>,
    /// Structured editor document, stored as a JSON string.
    pub body_tree: Option<String>,
}
