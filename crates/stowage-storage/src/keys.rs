//! Shared key layout for temp and permanent objects.
//!
//! - temp: `{root}{category}/temp/{uuid}{ext}`
//! - permanent: `{root}{category}/{yyyy}/{mm}/{uuid}{ext}`
//!
//! `root` is empty unless tenant scoping is enabled, in which case it is
//! `tenants/{tenant_id}/`.

use chrono::{DateTime, Datelike, Utc};
use stowage_core::models::extension_of;
use stowage_core::Category;
use uuid::Uuid;

const TEMP_SEGMENT: &str = "temp";
const TENANT_ROOT: &str = "tenants";

/// Key generation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyLayout {
    pub tenant_scoped: bool,
}

impl KeyLayout {
    pub fn new(tenant_scoped: bool) -> Self {
        Self { tenant_scoped }
    }

    /// Prefix under which all of a tenant's objects live. Empty when keys are not
    /// tenant scoped.
    pub fn tenant_root(&self, tenant_id: &str) -> String {
        if self.tenant_scoped {
            format!("{}/{}/", TENANT_ROOT, urlencoding::encode(tenant_id))
        } else {
            String::new()
        }
    }

    /// Generate a fresh temp key for an upload named `original_name`.
    pub fn temp_key(&self, tenant_id: &str, category: Category, original_name: &str) -> String {
        format!(
            "{}{}/{}/{}{}",
            self.tenant_root(tenant_id),
            category.as_str(),
            TEMP_SEGMENT,
            Uuid::new_v4(),
            extension_of(original_name).unwrap_or_default()
        )
    }

    /// Prefixes the temp sweep must list. Every listed key still has to pass
    /// [`TempKey::parse`] before it is treated as a temp object.
    pub fn temp_scan_prefixes(&self) -> Vec<String> {
        if self.tenant_scoped {
            vec![format!("{}/", TENANT_ROOT)]
        } else {
            Category::ALL
                .iter()
                .map(|c| format!("{}/{}/", c.as_str(), TEMP_SEGMENT))
                .collect()
        }
    }

    /// Prefixes holding permanent objects for a tenant, for orphan reports.
    pub fn permanent_scan_prefixes(&self, tenant_id: &str) -> Vec<String> {
        let root = self.tenant_root(tenant_id);
        Category::ALL
            .iter()
            .map(|c| format!("{}{}/", root, c.as_str()))
            .collect()
    }
}

/// A parsed temp key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempKey {
    pub root: String,
    pub category: Category,
    pub file_name: String,
}

impl TempKey {
    /// Parse `{root}{category}/temp/{file}`. Anything else is not a temp key.
    pub fn parse(key: &str) -> Option<TempKey> {
        if key.contains("..") || key.starts_with('/') {
            return None;
        }
        let (head, file_name) = key.rsplit_once('/')?;
        if file_name.is_empty() {
            return None;
        }
        let (head, segment) = head.rsplit_once('/')?;
        if segment != TEMP_SEGMENT {
            return None;
        }
        let (root, category) = match head.rsplit_once('/') {
            Some((root, category)) => (format!("{}/", root), category),
            None => (String::new(), head),
        };
        let category = category.parse::<Category>().ok()?;
        if category.as_str() != head.rsplit('/').next().unwrap_or_default() {
            return None;
        }
        Some(TempKey {
            root,
            category,
            file_name: file_name.to_string(),
        })
    }

    /// Derive the permanent key for promotion at `now`. A new UUID is generated;
    /// the extension is kept.
    pub fn permanent_key(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}/{:04}/{:02}/{}{}",
            self.root,
            self.category.as_str(),
            now.year(),
            now.month(),
            Uuid::new_v4(),
            extension_of(&self.file_name).unwrap_or_default()
        )
    }
}

pub fn is_temp_key(key: &str) -> bool {
    TempKey::parse(key).is_some()
}

/// Whether a key has the permanent `{category}/{yyyy}/{mm}/{file}` shape.
pub fn is_permanent_key(key: &str) -> bool {
    let parts: Vec<&str> = key.rsplitn(4, '/').collect();
    let [file, month, year, head] = parts.as_slice() else {
        return false;
    };
    let category = head.rsplit('/').next().unwrap_or_default();
    !file.is_empty()
        && year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
        && month.len() == 2
        && month.chars().all(|c| c.is_ascii_digit())
        && category.parse::<Category>().is_ok()
}
