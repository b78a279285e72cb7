//! Storage object model and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Category;

/// Lifecycle of a stored object. Transitions only ever go forward:
/// `Temp -> Permanent` by promotion, or `Temp` -> deleted by the temp sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Temp,
    Permanent,
}

/// An object living in the storage backend. The key is its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub key: String,
    pub tenant_id: String,
    pub category: Category,
    pub size: u64,
    pub content_type: String,
    pub lifecycle_state: LifecycleState,
    pub last_modified: DateTime<Utc>,
}
