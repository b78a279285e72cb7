//! Object reference extraction from content rows.
//!
//! A row can reference stored objects from three places: its thumbnail field,
//! `src="..."` attributes in raw markup, and image nodes of its structured tree.
//! Extraction is heuristic. It yields URLs; mapping them to storage keys is the
//! storage layer's job.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::content_tree::ContentNode;
use crate::models::ContentRow;

static SRC_ATTRIBUTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*"([^"<>]+)""#).ok());

/// What to do when a row's structured body cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionFailurePolicy {
    /// Treat the tree as having no references. Can undercount usage.
    #[default]
    FailOpen,
    /// Treat usage as indeterminate and deny quota checks until the row is repaired.
    FailClosed,
}

impl FromStr for ExtractionFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(ExtractionFailurePolicy::FailOpen),
            "fail_closed" | "closed" => Ok(ExtractionFailurePolicy::FailClosed),
            _ => Err(anyhow::anyhow!("Invalid extraction failure policy: {}", s)),
        }
    }
}

/// URLs referenced by one content row.
#[derive(Debug, Clone, Default)]
pub struct RowReferences {
    pub content_id: i64,
    pub urls: BTreeSet<String>,
    /// Parse error of the structured body, if any. Markup and thumbnail
    /// references are still collected.
    pub tree_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceExtractor;

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, row: &ContentRow) -> RowReferences {
        let mut refs = RowReferences {
            content_id: row.id,
            ..Default::default()
        };

        if let Some(thumbnail) = row.thumbnail_url.as_deref().map(str::trim) {
            if !thumbnail.is_empty() {
                refs.urls.insert(thumbnail.to_string());
            }
        }

        if let Some(markup) = row.body_markup.as_deref() {
            refs.urls.extend(markup_sources(markup));
        }

        if let Some(tree) = row.body_tree.as_deref().filter(|t| !t.trim().is_empty()) {
            match ContentNode::parse(tree) {
                Ok(node) => refs
                    .urls
                    .extend(node.image_sources().into_iter().map(str::to_string)),
                Err(e) => {
                    tracing::warn!(
                        content_id = row.id,
                        error = %e,
                        "Structured content could not be parsed, no tree references extracted"
                    );
                    refs.tree_error = Some(e.to_string());
                }
            }
        }

        refs
    }
}

/// Every `src="..."` value in raw markup, in document order.
pub fn markup_sources(markup: &str) -> Vec<String> {
    let Some(re) = SRC_ATTRIBUTE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(markup)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
