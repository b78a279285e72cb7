use regex::Regex;
use std::sync::LazyLock;
use stowage_core::models::normalize_mime;
use stowage_core::policy::{ContentScanPolicy, SUSPICIOUS_CONTENT_PATTERNS};
use stowage_core::UploadViolation;

static SUSPICIOUS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SUSPICIOUS_CONTENT_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok().map(|re| (*p, re)))
        .collect()
});

/// Pattern-based scan of text payloads for embedded script.
///
/// This is not malware scanning. It is off by default and only looks at
/// textual MIME types small enough to read in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentScanner {
    policy: ContentScanPolicy,
}

impl ContentScanner {
    pub fn new(policy: ContentScanPolicy) -> Self {
        Self { policy }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    fn is_scannable(&self, mime_type: &str, size: u64) -> bool {
        if size > self.policy.max_scan_size {
            return false;
        }
        let mime = normalize_mime(mime_type);
        mime.starts_with("text/") || mime == "application/json" || mime.ends_with("/xml")
    }

    /// First suspicious pattern found in `data`, as a violation.
    pub fn scan(&self, mime_type: &str, data: &[u8]) -> Option<UploadViolation> {
        if !self.policy.enabled || !self.is_scannable(mime_type, data.len() as u64) {
            return None;
        }
        let text = String::from_utf8_lossy(data);
        let (pattern, _) = SUSPICIOUS.iter().find(|(_, re)| re.is_match(&text))?;
        tracing::warn!(mime_type = %mime_type, pattern = %pattern, "Suspicious content detected");
        Some(UploadViolation::SuspiciousContent {
            pattern: pattern.trim_start_matches("(?i)").to_string(),
        })
    }
}
